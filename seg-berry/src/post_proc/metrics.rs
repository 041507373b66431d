//! 分割质量指标.

use ndarray::{s, ArrayView3, Zip};
use serde::Serialize;

use crate::consts::DICE_EPS;
use crate::data::BBox;
use crate::error::{SegError, SegResult};

/// 包围盒内的参考掩码与预测之间的一致性指标.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Metrics {
    /// Dice 系数, 保留 4 位小数.
    pub dice: f64,

    /// 体积差 `(|R| - |P|) * unit`, 单位 ml.
    pub volume_difference: f64,

    /// 相对体积差 `|R xor P| / (|R| + |P|)`.
    pub relative_volume_difference: f64,
}

/// 计算指标. 参考掩码截断为 `{0, 1}`, 预测中非零即前景.
///
/// 两者形状不一致时返回 [`SegError::ShapeMismatch`], 不给出任何部分结果.
/// 两者在包围盒内都为空时, Dice 为 1, 相对体积差为 0.
pub fn compute_metrics(
    reference: ArrayView3<u8>,
    prediction: ArrayView3<u8>,
    bbox: &BBox,
    unit: f64,
) -> SegResult<Metrics> {
    if reference.dim() != prediction.dim() {
        return Err(SegError::ShapeMismatch {
            reference: reference.dim(),
            prediction: prediction.dim(),
        });
    }
    if !bbox.fits(reference.dim()) {
        return Err(SegError::InvalidBox(bbox.coords()));
    }
    let [z1, y1, x1, z2, y2, x2] = bbox.coords();
    let r = reference.slice(s![z1..z2, y1..y2, x1..x2]);
    let p = prediction.slice(s![z1..z2, y1..y2, x1..x2]);

    let (mut both, mut nr, mut np) = (0usize, 0usize, 0usize);
    Zip::from(&r).and(&p).for_each(|&a, &b| {
        let (a, b) = (a != 0, b != 0);
        both += usize::from(a && b);
        nr += usize::from(a);
        np += usize::from(b);
    });

    let total = (nr + np) as f64;
    let dice = if nr + np == 0 {
        1.0
    } else {
        (2.0 * both as f64 / (total + DICE_EPS) * 1e4).round() / 1e4
    };
    let rvd = if nr + np == 0 {
        0.0
    } else {
        (nr + np - 2 * both) as f64 / total
    };
    Ok(Metrics {
        dice,
        volume_difference: (nr as f64 - np as f64) * unit,
        relative_volume_difference: rvd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn whole() -> BBox {
        BBox::whole((4, 5, 6)).unwrap()
    }

    #[test]
    fn test_disjoint() {
        let reference = Array3::<u8>::ones((4, 5, 6));
        let prediction = Array3::<u8>::zeros((4, 5, 6));
        let m = compute_metrics(reference.view(), prediction.view(), &whole(), 0.5).unwrap();
        assert_eq!(m.dice, 0.0);
        assert_eq!(m.relative_volume_difference, 1.0);
        assert_eq!(m.volume_difference, 60.0);
    }

    #[test]
    fn test_identical() {
        let mut reference = Array3::<u8>::zeros((4, 5, 6));
        reference.slice_mut(s![1..3, 1..4, 2..5]).fill(2);
        let prediction = reference.mapv(|v| u8::from(v > 0));
        let m = compute_metrics(reference.view(), prediction.view(), &whole(), 1.0).unwrap();
        assert_eq!(m.dice, 1.0);
        assert_eq!(m.volume_difference, 0.0);
        assert_eq!(m.relative_volume_difference, 0.0);
    }

    #[test]
    fn test_partial_overlap_rounding() {
        let mut reference = Array3::<u8>::zeros((1, 1, 6));
        let mut prediction = Array3::<u8>::zeros((1, 1, 6));
        reference.slice_mut(s![.., .., 0..3]).fill(1);
        prediction.slice_mut(s![.., .., 2..6]).fill(1);
        let bbox = BBox::whole((1, 1, 6)).unwrap();
        let m = compute_metrics(reference.view(), prediction.view(), &bbox, 1.0).unwrap();
        // 2 * 1 / 7
        assert_eq!(m.dice, 0.2857);
        assert_eq!(m.volume_difference, -1.0);
        assert!((m.relative_volume_difference - 5.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_only_box_counts() {
        let reference = Array3::<u8>::ones((4, 5, 6));
        let mut prediction = Array3::<u8>::zeros((4, 5, 6));
        prediction.slice_mut(s![0..2, .., ..]).fill(1);
        let bbox = BBox::new([0, 0, 0, 2, 5, 6], (4, 5, 6)).unwrap();
        let m = compute_metrics(reference.view(), prediction.view(), &bbox, 1.0).unwrap();
        assert_eq!(m.dice, 1.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array3::<u8>::zeros((4, 5, 6));
        let b = Array3::<u8>::zeros((4, 5, 7));
        let err = compute_metrics(a.view(), b.view(), &whole(), 1.0).unwrap_err();
        assert!(matches!(err, SegError::ShapeMismatch { .. }));
        assert_eq!(err.status_code(), 2);
    }

    #[test]
    fn test_both_empty() {
        let a = Array3::<u8>::zeros((4, 5, 6));
        let m = compute_metrics(a.view(), a.view(), &whole(), 1.0).unwrap();
        assert_eq!(m.dice, 1.0);
        assert_eq!(m.relative_volume_difference, 0.0);
    }
}
