//! 测地距离: 图像灰度加权的最短路径距离.

use itertools::iproduct;
use ndarray::{Array3, ArrayView3};

/// 测地距离原语. 输入图像, 二值种子图 (非零为种子), 体素间距,
/// 灰度权重 `lambda` 与扫描轮数, 输出与图像同形状的距离场.
pub trait GeodesicDistance {
    /// 计算距离场. 没有种子时返回全零.
    fn distance(
        &self,
        image: ArrayView3<f32>,
        seeds: ArrayView3<u8>,
        spacing: [f32; 3],
        lambda: f32,
        iterations: usize,
    ) -> Array3<f32>;
}

/// 基于前向/后向光栅扫描的近似测地距离.
///
/// 单步代价为 `sqrt((1 - lambda) * l^2 + lambda * g^2)`,
/// 其中 `l` 是两体素的物理距离, `g` 是灰度差.
#[derive(Copy, Clone, Debug, Default)]
pub struct RasterScan;

/// 初始距离. 取有限值以便累加.
const FAR: f32 = 1e10;

/// 字典序小于原点的 13 个 26-邻域偏移, 前向扫描时这些邻居已被访问.
fn forward_offsets() -> Vec<[isize; 3]> {
    iproduct!(-1isize..=1, -1isize..=1, -1isize..=1)
        .map(|(a, b, c)| [a, b, c])
        .filter(|o| *o < [0, 0, 0])
        .collect()
}

impl RasterScan {
    fn pass(
        d: &mut Array3<f32>,
        image: &ArrayView3<f32>,
        offsets: &[([isize; 3], f32)],
        lambda: f32,
        forward: bool,
    ) {
        let (zn, yn, xn) = d.dim();
        let order = |n: usize, i: usize| if forward { i } else { n - 1 - i };
        for (iz, iy, ix) in iproduct!(0..zn, 0..yn, 0..xn) {
            let p = (order(zn, iz), order(yn, iy), order(xn, ix));
            let vp = image[p];
            let mut best = d[p];
            for &([oz, oy, ox], l2) in offsets {
                let q = (
                    p.0.wrapping_add_signed(oz),
                    p.1.wrapping_add_signed(oy),
                    p.2.wrapping_add_signed(ox),
                );
                let Some(&dq) = d.get(q) else {
                    continue;
                };
                let g = vp - image[q];
                let step = ((1.0 - lambda) * l2 + lambda * g * g).sqrt();
                best = best.min(dq + step);
            }
            d[p] = best;
        }
    }
}

impl GeodesicDistance for RasterScan {
    fn distance(
        &self,
        image: ArrayView3<f32>,
        seeds: ArrayView3<u8>,
        spacing: [f32; 3],
        lambda: f32,
        iterations: usize,
    ) -> Array3<f32> {
        if seeds.iter().all(|s| *s == 0) {
            return Array3::zeros(image.dim());
        }
        let lambda = lambda.clamp(0.0, 1.0);
        let weighted = |o: [isize; 3]| {
            let l2 = (0..3)
                .map(|i| (o[i] as f32 * spacing[i]).powi(2))
                .sum::<f32>();
            (o, l2)
        };
        let fwd: Vec<_> = forward_offsets().into_iter().map(weighted).collect();
        let bwd: Vec<_> = fwd
            .iter()
            .map(|&(o, l2)| ([-o[0], -o[1], -o[2]], l2))
            .collect();

        let mut d = seeds.mapv(|s| if s != 0 { 0.0 } else { FAR });
        for _ in 0..iterations.max(1) {
            Self::pass(&mut d, &image, &fwd, lambda, true);
            Self::pass(&mut d, &image, &bwd, lambda, false);
        }
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets() {
        let o = forward_offsets();
        assert_eq!(o.len(), 13);
        assert!(o.contains(&[-1, 1, 1]));
        assert!(o.contains(&[0, 0, -1]));
        assert!(!o.contains(&[0, 0, 1]));
    }

    #[test]
    fn test_spatial_only_matches_chamfer() {
        let image = Array3::<f32>::zeros((1, 1, 6));
        let mut seeds = Array3::<u8>::zeros((1, 1, 6));
        seeds[(0, 0, 0)] = 1;
        let d = RasterScan.distance(image.view(), seeds.view(), [1.0; 3], 0.0, 2);
        for x in 0..6 {
            assert!((d[(0, 0, x)] - x as f32).abs() < 1e-5);
        }
    }

    #[test]
    fn test_intensity_barrier() {
        // 中间一列为高亮墙, 纯灰度距离在墙后陡增.
        let mut image = Array3::<f32>::zeros((1, 3, 5));
        for y in 0..3 {
            image[(0, y, 2)] = 100.0;
        }
        let mut seeds = Array3::<u8>::zeros((1, 3, 5));
        seeds[(0, 1, 0)] = 1;
        let d = RasterScan.distance(image.view(), seeds.view(), [1.0; 3], 1.0, 2);
        assert_eq!(d[(0, 1, 0)], 0.0);
        assert!(d[(0, 1, 1)] < 1e-5);
        assert!((d[(0, 1, 4)] - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_no_seed() {
        let image = Array3::<f32>::ones((2, 2, 2));
        let seeds = Array3::<u8>::zeros((2, 2, 2));
        let d = RasterScan.distance(image.view(), seeds.view(), [1.0; 3], 1.0, 2);
        assert!(d.iter().all(|v| *v == 0.0));
    }
}
