//! 引导图合成: 将种子点转换为空间先验 (指数衰减, 欧氏距离, 测地距离).

use ndarray::{Array3, Array4, ArrayView3};
use ordered_float::OrderedFloat;

use crate::config::GuideConfig;
use crate::consts::{ElemType, BG_GUIDE_WEIGHT};
use crate::data::{Seed, SeedSet};

pub mod edt;
pub mod geodesic;

pub use geodesic::{GeodesicDistance, RasterScan};

/// 标准差下限, 避免采样间距为无穷大.
const MIN_STDDEV: f32 = 1e-3;

/// 引导图类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GuideKind {
    /// 以种子为中心的高斯衰减, 取值 `(0, 1]`.
    Exponential,

    /// 到最近种子的欧氏距离.
    Euclidean,

    /// 到最近种子的测地距离.
    Geodesic,
}

impl GuideKind {
    /// 简称, 也用于拼接远程模型名.
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::Exponential => "exp",
            Self::Euclidean => "euc",
            Self::Geodesic => "geo",
        }
    }
}

/// 前景/背景两张引导图.
#[derive(Clone, Debug)]
pub struct GuideMaps {
    /// 前景引导图.
    pub foreground: Array3<f32>,

    /// 背景引导图 (已乘 `BG_GUIDE_WEIGHT`).
    pub background: Array3<f32>,
}

impl GuideMaps {
    /// 按最后一维堆叠为 `(D, H, W, 2)`, 前景在前.
    pub fn stacked(&self) -> Array4<f32> {
        let (d, h, w) = self.foreground.dim();
        Array4::from_shape_fn((d, h, w, 2), |(z, y, x, c)| match c {
            0 => self.foreground[(z, y, x)],
            _ => self.background[(z, y, x)],
        })
    }
}

/// 由种子列表生成种子掩码. 越界的种子被忽略.
fn seed_mask(shape: (usize, usize, usize), seeds: &[Seed]) -> Array3<u8> {
    let mut mask = Array3::<u8>::zeros(shape);
    for s in seeds.iter() {
        if let Some(p) = mask.get_mut(s.pos) {
            *p = 1;
        }
    }
    mask
}

/// 计算单个类别的引导图. `seeds` 为子体局部坐标. 没有种子时返回全零.
pub fn class_guide(
    kind: GuideKind,
    image: ArrayView3<f32>,
    seeds: &[Seed],
    cfg: &GuideConfig,
    geodesic: &dyn GeodesicDistance,
) -> Array3<f32> {
    let shape = image.dim();
    let mask = seed_mask(shape, seeds);
    match kind {
        GuideKind::Exponential => {
            // 所有种子共用第一个种子的标准差.
            let Some(first) = seeds.first() else {
                return Array3::zeros(shape);
            };
            let sampling = first.stddev.map(|s| 1.0 / s.max(MIN_STDDEV) as f64);
            edt::distance_to_seeds(mask.view(), sampling)
                .map(|d| d.mapv(|v| (-v * v / 2.0).exp() as f32))
                .unwrap_or_else(|| Array3::zeros(shape))
        }
        GuideKind::Euclidean => edt::distance_to_seeds(mask.view(), [1.0; 3])
            .map(|d| d.mapv(|v| v as f32))
            .unwrap_or_else(|| Array3::zeros(shape)),
        GuideKind::Geodesic => {
            if seeds.is_empty() {
                return Array3::zeros(shape);
            }
            geodesic.distance(
                image,
                mask.view(),
                [1.0; 3],
                cfg.geodesic_lambda,
                cfg.geodesic_iterations,
            )
        }
    }
}

/// 生成前景/背景引导图, 背景引导图乘以 `BG_GUIDE_WEIGHT`.
pub fn synthesize(
    kind: GuideKind,
    image: ArrayView3<f32>,
    seeds: &SeedSet,
    cfg: &GuideConfig,
    geodesic: &dyn GeodesicDistance,
) -> GuideMaps {
    let foreground = class_guide(kind, image, seeds.of(ElemType::Foreground), cfg, geodesic);
    let mut background = class_guide(kind, image, seeds.of(ElemType::Background), cfg, geodesic);
    background.mapv_inplace(|v| v * BG_GUIDE_WEIGHT);
    GuideMaps {
        foreground,
        background,
    }
}

/// 中位数. `v` 为空时返回 `None`.
fn median(v: &mut [f32]) -> Option<f32> {
    if v.is_empty() {
        return None;
    }
    v.sort_unstable_by_key(|x| OrderedFloat(*x));
    let n = v.len();
    Some(if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    })
}

/// 二值图前景点的稳健中心与标准差.
///
/// 中心取各轴中位数, 标准差取 `1.4826 * MAD`, 并以 `min_std` 为下限.
/// 没有前景点时返回 `None`.
pub fn robust_moments(mask: ArrayView3<u8>, min_std: f32) -> Option<([f32; 3], [f32; 3])> {
    let points: Vec<[f32; 3]> = mask
        .indexed_iter()
        .filter(|(_, v)| **v != 0)
        .map(|((z, y, x), _)| [z as f32, y as f32, x as f32])
        .collect();
    let mut center = [0.0f32; 3];
    let mut std = [0.0f32; 3];
    for axis in 0..3 {
        let mut coords: Vec<f32> = points.iter().map(|p| p[axis]).collect();
        let c = median(&mut coords)?;
        let mut dev: Vec<f32> = coords.iter().map(|v| (v - c).abs()).collect();
        let mad = median(&mut dev)?;
        center[axis] = c;
        std[axis] = (1.4826 * mad).max(min_std);
    }
    Some((center, std))
}

/// 将一块涂抹区域概括为单个种子: 位置取稳健中心, 标准差取稳健标准差.
///
/// 区域为空时返回 `None`.
pub fn region_seed(mask: ArrayView3<u8>, min_std: f32) -> Option<Seed> {
    let (center, std) = robust_moments(mask, min_std)?;
    let [z, y, x] = center.map(|c| c.round() as usize);
    Some(Seed {
        pos: (z, y, x),
        stddev: std,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Array3<f32> {
        Array3::from_shape_fn((6, 8, 8), |(z, y, x)| (z + y + x) as f32)
    }

    #[test]
    fn test_zero_seeds_all_variants() {
        let img = image();
        let cfg = GuideConfig::default();
        let seeds = SeedSet::default();
        for kind in [GuideKind::Exponential, GuideKind::Euclidean, GuideKind::Geodesic] {
            let g = synthesize(kind, img.view(), &seeds, &cfg, &RasterScan);
            assert!(g.foreground.iter().all(|v| *v == 0.0), "{kind:?}");
            assert!(g.background.iter().all(|v| *v == 0.0), "{kind:?}");
        }
    }

    #[test]
    fn test_euclidean_zero_at_seed() {
        let img = image();
        let cfg = GuideConfig::default();
        let seeds = SeedSet::from_points(&[(2, 3, 4), (5, 7, 0)], &[(0, 0, 0)], 7.0);
        let g = synthesize(GuideKind::Euclidean, img.view(), &seeds, &cfg, &RasterScan);
        assert_eq!(g.foreground[(2, 3, 4)], 0.0);
        assert_eq!(g.foreground[(5, 7, 0)], 0.0);
        assert_eq!(g.background[(0, 0, 0)], 0.0);
        assert!((g.foreground[(2, 3, 6)] - 2.0).abs() < 1e-6);
        // 背景引导图放大 1.5 倍.
        assert!((g.background[(0, 0, 2)] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_exponential_decay() {
        let img = image();
        let cfg = GuideConfig::default();
        let seeds = SeedSet::from_points(&[(2, 3, 4)], &[], 2.0);
        let g = synthesize(GuideKind::Exponential, img.view(), &seeds, &cfg, &RasterScan);
        assert!((g.foreground[(2, 3, 4)] - 1.0).abs() < 1e-6);
        // 沿宽方向一个标准差: exp(-1/2).
        let expect = (-0.5f32).exp();
        assert!((g.foreground[(2, 3, 6)] - expect).abs() < 1e-5);
        assert!(g.foreground.iter().all(|v| *v > 0.0 && *v <= 1.0));
        assert!(g.background.iter().all(|v| *v == 0.0));

        let st = g.stacked();
        assert_eq!(st.dim(), (6, 8, 8, 2));
        assert_eq!(st[(2, 3, 4, 0)], g.foreground[(2, 3, 4)]);
    }

    #[test]
    fn test_robust_moments() {
        let mut m = Array3::<u8>::zeros((5, 5, 5));
        assert!(robust_moments(m.view(), 0.0).is_none());
        m[(2, 2, 1)] = 1;
        m[(2, 2, 2)] = 1;
        m[(2, 2, 3)] = 1;
        let (c, s) = robust_moments(m.view(), 0.5).unwrap();
        assert_eq!(c, [2.0, 2.0, 2.0]);
        assert_eq!(s[0], 0.5);
        assert!((s[2] - 1.4826).abs() < 1e-5);
    }

    #[test]
    fn test_region_seed() {
        let mut m = Array3::<u8>::zeros((4, 9, 9));
        m.slice_mut(ndarray::s![1..3, 2..7, 3..6]).fill(1);
        let seed = region_seed(m.view(), 1.0).unwrap();
        assert_eq!(seed.pos, (2, 4, 4));
        assert!(seed.stddev.iter().all(|s| *s >= 1.0));
        assert!(region_seed(Array3::<u8>::zeros((2, 2, 2)).view(), 1.0).is_none());
    }
}
