//! 推理前的子体归一化, 缩放与补零, 以及推理后的逆映射.

use ndarray::{s, Array3, Array4, ArrayView3, Axis, Zip};

use crate::consts::{PAD_MULTIPLE, Z_SCORE_EPS};
use crate::Idx3d;

/// 正灰度体素的均值与 (总体) 标准差. 没有正灰度体素时返回 `None`.
pub fn positive_moments(patch: ArrayView3<f32>) -> Option<(f32, f32)> {
    let (n, sum) = patch
        .iter()
        .filter(|v| **v > 0.0)
        .fold((0usize, 0.0f64), |(n, s), &v| (n + 1, s + v as f64));
    if n == 0 {
        return None;
    }
    let mean = sum / n as f64;
    let var = patch
        .iter()
        .filter(|v| **v > 0.0)
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    Some((mean as f32, var.sqrt() as f32))
}

/// 负值截断为 0, 然后只对正灰度体素做 z-score. 其余体素保持 0.
pub fn normalize(patch: ArrayView3<f32>) -> Array3<f32> {
    let mut out = patch.mapv(|v| v.max(0.0));
    if let Some((mean, std)) = positive_moments(out.view()) {
        out.mapv_inplace(|v| if v > 0.0 { (v - mean) / (std + Z_SCORE_EPS) } else { v });
    }
    out
}

/// 输出下标在输入中的连续坐标. 端点对齐.
#[inline]
fn source_coord(o: usize, n_in: usize, n_out: usize) -> f64 {
    if n_out <= 1 || n_in <= 1 {
        0.0
    } else {
        o as f64 * (n_in - 1) as f64 / (n_out - 1) as f64
    }
}

/// 三线性缩放到 `shape`.
pub fn zoom_linear(a: ArrayView3<f32>, shape: Idx3d) -> Array3<f32> {
    let (d, h, w) = a.dim();
    let lerp_axis = |o: usize, n_in: usize, n_out: usize| {
        let c = source_coord(o, n_in, n_out);
        let i0 = (c.floor() as usize).min(n_in - 1);
        let i1 = (i0 + 1).min(n_in - 1);
        (i0, i1, (c - i0 as f64) as f32)
    };
    Array3::from_shape_fn(shape, |(z, y, x)| {
        let (z0, z1, fz) = lerp_axis(z, d, shape.0);
        let (y0, y1, fy) = lerp_axis(y, h, shape.1);
        let (x0, x1, fx) = lerp_axis(x, w, shape.2);
        let plane = |z: usize| {
            let row = |y: usize| a[(z, y, x0)] * (1.0 - fx) + a[(z, y, x1)] * fx;
            row(y0) * (1.0 - fy) + row(y1) * fy
        };
        plane(z0) * (1.0 - fz) + plane(z1) * fz
    })
}

/// 最近邻缩放到 `shape`, 用于标签图.
pub fn zoom_nearest(a: ArrayView3<u8>, shape: Idx3d) -> Array3<u8> {
    let (d, h, w) = a.dim();
    let near = |o: usize, n_in: usize, n_out: usize| {
        ((source_coord(o, n_in, n_out) + 0.5).floor() as usize).min(n_in - 1)
    };
    Array3::from_shape_fn(shape, |(z, y, x)| {
        a[(near(z, d, shape.0), near(y, h, shape.1), near(x, w, shape.2))]
    })
}

/// 向上取整到 `m` 的倍数所需的补齐量.
#[inline]
fn pad_amount(n: usize, m: usize) -> usize {
    (m - n % m) % m
}

/// 一次推理的子体几何变换.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PatchGeometry {
    /// 包围盒原始形状.
    pub original: Idx3d,
    /// 缩放后的形状. 未缩放时为 `None`.
    pub zoomed: Option<Idx3d>,
    /// 高和宽共用的缩放倍率, 不超过 1.
    pub factor: f32,
    /// 三个轴向末端补零数.
    pub pad: [usize; 3],
}

impl PatchGeometry {
    /// 决定缩放与补零方式.
    ///
    /// 高或宽超过上限时, 以同一倍率 `min(max_h / h, max_w / w)` 缩小高和宽,
    /// 深度不变. 之后将高和宽补齐到 `PAD_MULTIPLE` 的倍数, 深度为奇数时补 1 层.
    pub fn plan(original: Idx3d, max_h: usize, max_w: usize) -> Self {
        let (d, h, w) = original;
        let (zoomed, factor) = if h > max_h || w > max_w {
            let f = (max_h as f64 / h as f64).min(max_w as f64 / w as f64);
            let fit = |n: usize, max: usize| ((n as f64 * f).round() as usize).clamp(1, max);
            (Some((d, fit(h, max_h), fit(w, max_w))), f as f32)
        } else {
            (None, 1.0)
        };
        let (_, rh, rw) = zoomed.unwrap_or(original);
        Self {
            original,
            zoomed,
            factor,
            pad: [d % 2, pad_amount(rh, PAD_MULTIPLE), pad_amount(rw, PAD_MULTIPLE)],
        }
    }

    /// 缩放后 (补零前) 的形状.
    #[inline]
    pub fn resized(&self) -> Idx3d {
        self.zoomed.unwrap_or(self.original)
    }

    /// 送入网络的最终形状.
    #[inline]
    pub fn padded(&self) -> Idx3d {
        let (d, h, w) = self.resized();
        (d + self.pad[0], h + self.pad[1], w + self.pad[2])
    }

    /// 各轴缩放倍率. 深度不缩放.
    #[inline]
    pub fn scale(&self) -> [f32; 3] {
        [1.0, self.factor, self.factor]
    }

    /// 将局部坐标映射到网络输入坐标.
    pub fn map_point(&self, (z, y, x): Idx3d) -> Idx3d {
        let [sz, sy, sx] = self.scale();
        let (d, h, w) = self.resized();
        let f = |v: usize, s: f32, n: usize| ((v as f32 * s) as usize).min(n - 1);
        (f(z, sz, d), f(y, sy, h), f(x, sx, w))
    }

    /// 归一化, 缩放, 补零.
    pub fn prepare(&self, patch: ArrayView3<f32>) -> Array3<f32> {
        let normed = normalize(patch);
        let resized = match self.zoomed {
            Some(shape) => zoom_linear(normed.view(), shape),
            None => normed,
        };
        let (d, h, w) = resized.dim();
        let mut out = Array3::<f32>::zeros(self.padded());
        out.slice_mut(s![..d, ..h, ..w]).assign(&resized);
        out
    }

    /// 去掉补零.
    pub fn unpad<'a, T>(&self, a: ArrayView3<'a, T>) -> ArrayView3<'a, T> {
        let (d, h, w) = self.resized();
        a.slice_move(s![..d, ..h, ..w])
    }

    /// 将网络输出的标签图映射回包围盒原始形状.
    pub fn restore(&self, labels: ArrayView3<u8>) -> Array3<u8> {
        let cropped = self.unpad(labels);
        match self.zoomed {
            Some(_) => zoom_nearest(cropped, self.original),
            None => cropped.to_owned(),
        }
    }
}

/// 对 `[.., .., .., 2]` 的双通道得分取 argmax. 相等时取 0.
pub fn argmax2(scores: &Array4<f32>) -> Array3<u8> {
    let (d, h, w, _) = scores.dim();
    let mut out = Array3::<u8>::zeros((d, h, w));
    Zip::from(&mut out)
        .and(scores.lanes(Axis(3)))
        .for_each(|o, lane| *o = u8::from(lane[1] > lane[0]));
    out
}
