//! 消融实验依赖的通用组件.

use ndarray::Array3;
use seg_berry::Volume;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 合成椭球体模: 前景灰度 `fg`, 背景灰度 `bg`, 叠加确定性的条纹噪声 (幅度 `noise`).
///
/// 返回体数据和对应的参考掩码.
pub fn ellipsoid_phantom(
    shape: (usize, usize, usize),
    fg: f32,
    bg: f32,
    noise: f32,
) -> (Volume, Array3<u8>) {
    let (d, h, w) = shape;
    let c = [d as f32 / 2.0, h as f32 / 2.0, w as f32 / 2.0];
    let r = [d as f32 / 3.0, h as f32 / 3.0, w as f32 / 4.0];
    let mask = Array3::from_shape_fn(shape, |(z, y, x)| {
        let q = [z as f32, y as f32, x as f32];
        let s: f32 = (0..3).map(|i| ((q[i] - c[i]) / r[i]).powi(2)).sum();
        u8::from(s <= 1.0)
    });
    let data = Array3::from_shape_fn(shape, |(z, y, x)| {
        let base = if mask[(z, y, x)] == 1 { fg } else { bg };
        base + noise * (((x * 7 + y * 3 + z) % 5) as f32 - 2.0) / 2.0
    });
    (Volume::new(data, [1.0, 0.8, 0.8], "phantom"), mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seg_berry::VoxelGeometry;

    #[test]
    fn test_phantom() {
        let (v, m) = ellipsoid_phantom((12, 24, 24), 200.0, 40.0, 10.0);
        assert_eq!(v.shape(), m.dim());
        assert_eq!(m[(6, 12, 12)], 1);
        assert_eq!(m[(0, 0, 0)], 0);
        assert!((v[(6, 12, 12)] - 200.0).abs() <= 10.0);
    }
}
