//! 精确欧氏距离变换 (Felzenszwalb & Huttenlocher), 支持各轴采样间距.

use ndarray::{Array3, ArrayView3, ArrayViewMut2, Axis};

/// 未到达体素的初始平方距离. 取有限值以避免 `inf - inf`.
const FAR: f64 = 1e20;

/// 计算每个体素到最近种子 (`seeds` 中非零体素) 的欧氏距离.
///
/// `sampling` 为 z, 高, 宽方向的体素间距. 不存在种子时返回 `None`.
pub fn distance_to_seeds(seeds: ArrayView3<u8>, sampling: [f64; 3]) -> Option<Array3<f64>> {
    if seeds.iter().all(|s| *s == 0) {
        return None;
    }
    let mut d = seeds.mapv(|s| if s != 0 { 0.0 } else { FAR });
    for (axis, &w) in sampling.iter().enumerate() {
        transform_axis(&mut d, axis, w);
    }
    d.mapv_inplace(f64::sqrt);
    Some(d)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};

        /// 沿 `axis` 方向对所有一维线做平方距离变换.
        fn transform_axis(d: &mut Array3<f64>, axis: usize, w: f64) {
            let (outer, lane) = split_axis(axis);
            d.axis_iter_mut(Axis(outer))
                .into_par_iter()
                .for_each(|plane| transform_plane(plane, lane, w));
        }
    } else {
        /// 沿 `axis` 方向对所有一维线做平方距离变换.
        fn transform_axis(d: &mut Array3<f64>, axis: usize, w: f64) {
            let (outer, lane) = split_axis(axis);
            d.axis_iter_mut(Axis(outer))
                .for_each(|plane| transform_plane(plane, lane, w));
        }
    }
}

/// 选择一个不包含 `axis` 的外层轴并行切分, 返回 (外层轴, 平面内的线方向).
#[inline]
fn split_axis(axis: usize) -> (usize, usize) {
    match axis {
        0 => (1, 0),
        1 => (0, 0),
        _ => (0, 1),
    }
}

fn transform_plane(mut plane: ArrayViewMut2<f64>, lane_axis: usize, w: f64) {
    let n = plane.len_of(Axis(lane_axis));
    let mut f = vec![0.0; n];
    let mut out = vec![0.0; n];
    let mut v = vec![0usize; n];
    let mut z = vec![0.0; n + 1];
    for mut lane in plane.lanes_mut(Axis(lane_axis)) {
        for (dst, src) in f.iter_mut().zip(lane.iter()) {
            *dst = *src;
        }
        lower_envelope(&f, w * w, &mut out, &mut v, &mut z);
        for (dst, src) in lane.iter_mut().zip(out.iter()) {
            *dst = *src;
        }
    }
}

/// 一维平方距离变换: `out[q] = min_p (w2 * (q - p)^2 + f[p])`.
fn lower_envelope(f: &[f64], w2: f64, out: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let sq = |q: usize| w2 * (q * q) as f64;
    let mut k = 0usize;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let mut s = intersect(f, &sq, w2, q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(f, &sq, w2, q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }
    k = 0;
    for (q, o) in out.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let dq = q as f64 - p as f64;
        *o = w2 * dq * dq + f[p];
    }
}

/// 以 `q`, `p` 为顶点的两条抛物线交点的横坐标.
#[inline]
fn intersect<F: Fn(usize) -> f64>(f: &[f64], sq: &F, w2: f64, q: usize, p: usize) -> f64 {
    ((f[q] + sq(q)) - (f[p] + sq(p))) / (2.0 * w2 * (q - p) as f64)
}
