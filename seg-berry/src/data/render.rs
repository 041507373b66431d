//! 切片合成渲染: 灰度底图 + 掩码叠加 (半透明填充或轮廓).

use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use super::{neighbour4, IntensityWindow};
use crate::config::RenderConfig;

/// 掩码叠加样式.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    /// 混合系数, `(1 - alpha) * 底色 + alpha * 叠加色`.
    pub alpha: f32,

    /// 分割结果颜色.
    pub segmentation_color: [u8; 3],

    /// 参考掩码颜色.
    pub reference_color: [u8; 3],

    /// 为 `true` 时只画掩码轮廓.
    pub contour: bool,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for OverlayStyle {
    fn from(cfg: &RenderConfig) -> Self {
        Self {
            alpha: cfg.alpha.clamp(0.0, 1.0),
            segmentation_color: cfg.segmentation_color,
            reference_color: cfg.reference_color,
            contour: cfg.contour,
        }
    }
}

/// 用 `window` 将二维切片映射为 RGB 灰度图. 非有限值画为黑色.
pub fn to_rgb(slice: ArrayView2<f32>, window: &IntensityWindow) -> RgbImage {
    let (h, w) = slice.dim();
    let mut img = RgbImage::new(w as u32, h as u32);
    for ((r, c), &v) in slice.indexed_iter() {
        let g = window.eval(v).unwrap_or(0);
        img.put_pixel(c as u32, r as u32, Rgb([g, g, g]));
    }
    img
}

/// 掩码像素是否位于轮廓上, 即存在 4-邻居在掩码外 (或图像外).
#[inline]
fn on_contour(mask: &ArrayView2<u8>, pos: (usize, usize)) -> bool {
    neighbour4(pos)
        .into_iter()
        .any(|p| mask.get(p).map_or(true, |v| *v == 0))
}

/// 将 `mask` 以 `color` 叠加到 `img` 上.
///
/// 填充模式按 `style.alpha` 混合; 轮廓模式直接覆盖轮廓像素.
/// `mask` 的形状必须与 `img` 一致, 否则 panic.
pub fn overlay(img: &mut RgbImage, mask: ArrayView2<u8>, color: [u8; 3], style: &OverlayStyle) {
    let (h, w) = mask.dim();
    assert_eq!((img.height() as usize, img.width() as usize), (h, w));
    let a = style.alpha;
    for ((r, c), &m) in mask.indexed_iter() {
        if m == 0 {
            continue;
        }
        let px = img.get_pixel_mut(c as u32, r as u32);
        if style.contour {
            if on_contour(&mask, (r, c)) {
                *px = Rgb(color);
            }
        } else {
            for (ch, &col) in px.0.iter_mut().zip(color.iter()) {
                *ch = ((1.0 - a) * *ch as f32 + a * col as f32).round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_blend() {
        let slice = Array2::<f32>::from_elem((2, 3), 0.0);
        let window = IntensityWindow::new(0.0, 1.0).unwrap();
        let mut img = to_rgb(slice.view(), &window);
        assert_eq!((img.height(), img.width()), (2, 3));

        let mut mask = Array2::<u8>::zeros((2, 3));
        mask[(1, 2)] = 1;
        let style = OverlayStyle::default();
        overlay(&mut img, mask.view(), [255, 255, 0], &style);
        assert_eq!(img.get_pixel(2, 1).0, [128, 128, 0]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_contour() {
        let slice = Array2::<f32>::zeros((5, 5));
        let window = IntensityWindow::new(0.0, 1.0).unwrap();
        let mut img = to_rgb(slice.view(), &window);
        let mut mask = Array2::<u8>::zeros((5, 5));
        mask.slice_mut(ndarray::s![1..4, 1..4]).fill(1);
        let style = OverlayStyle {
            contour: true,
            ..Default::default()
        };
        overlay(&mut img, mask.view(), [255, 0, 0], &style);
        // 中心像素不在轮廓上.
        assert_eq!(img.get_pixel(2, 2).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(3, 2).0, [255, 0, 0]);
    }
}
