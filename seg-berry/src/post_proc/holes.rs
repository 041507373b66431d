//! 二维空洞填充.

use std::collections::VecDeque;

use ndarray::{Array2, Array3, ArrayViewMut2, Axis};

use crate::config::HoleFilling;
use crate::consts::gray::{SEG_BACKGROUND, SEG_FOREGROUND};
use crate::data::neighbour4;

/// 填充单张切片中与边界不 4-连通的背景区域.
pub fn fill_holes_2d(mut slice: ArrayViewMut2<u8>) {
    let (h, w) = slice.dim();
    let mut outside = Array2::<bool>::from_elem((h, w), false);
    let mut queue: VecDeque<_> = slice
        .indexed_iter()
        .filter(|((y, x), v)| {
            (*y == 0 || *x == 0 || *y + 1 == h || *x + 1 == w) && **v == SEG_BACKGROUND
        })
        .map(|(p, _)| p)
        .collect();
    for &p in queue.iter() {
        outside[p] = true;
    }
    while let Some(pos) = queue.pop_front() {
        for n in neighbour4(pos) {
            if slice.get(n) == Some(&SEG_BACKGROUND) && !outside[n] {
                outside[n] = true;
                queue.push_back(n);
            }
        }
    }
    slice.zip_mut_with(&outside, |v, &o| {
        if !o {
            *v = SEG_FOREGROUND;
        }
    });
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};

        fn fill_all(mask: &mut Array3<u8>) {
            mask.axis_iter_mut(Axis(0))
                .into_par_iter()
                .for_each(fill_holes_2d);
        }
    } else {
        fn fill_all(mask: &mut Array3<u8>) {
            mask.axis_iter_mut(Axis(0)).for_each(fill_holes_2d);
        }
    }
}

/// 按策略填充轴向切片上的空洞. `seed_slice` 为第一个前景种子所在切片.
pub fn fill_holes(mask: &mut Array3<u8>, policy: HoleFilling, seed_slice: Option<usize>) {
    match policy {
        HoleFilling::None => {}
        HoleFilling::SeedSlice => {
            if let Some(z) = seed_slice.filter(|z| *z < mask.len_of(Axis(0))) {
                fill_holes_2d(mask.index_axis_mut(Axis(0), z));
            }
        }
        HoleFilling::AllSlices => fill_all(mask),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    /// 5x5 的方环, 中心 3x3 中有一个空洞.
    fn ring() -> Array2<u8> {
        let mut a = Array2::<u8>::zeros((7, 7));
        a.slice_mut(s![1..6, 1..6]).fill(1);
        a[(3, 3)] = 0;
        a
    }

    #[test]
    fn test_fill_enclosed_hole() {
        let mut a = ring();
        fill_holes_2d(a.view_mut());
        assert_eq!(a[(3, 3)], 1);
        assert_eq!(a[(0, 0)], 0);
        assert_eq!(a.iter().filter(|v| **v == 1).count(), 25);
    }

    #[test]
    fn test_diagonal_gap_is_still_a_hole() {
        // 仅对角相通的背景不与外部 4-连通.
        let mut a = ring();
        a[(2, 2)] = 0;
        a[(1, 1)] = 0;
        fill_holes_2d(a.view_mut());
        assert_eq!(a[(3, 3)], 1);
        assert_eq!(a[(2, 2)], 1);
        // (1, 1) 通过边界背景 4-连通到外部.
        assert_eq!(a[(1, 1)], 0);
    }

    #[test]
    fn test_open_region_untouched() {
        let mut a = ring();
        a[(3, 5)] = 0;
        a[(3, 4)] = 0;
        fill_holes_2d(a.view_mut());
        assert_eq!(a[(3, 3)], 0);
    }

    #[test]
    fn test_policies() {
        let mut m = Array3::<u8>::zeros((3, 7, 7));
        for mut z in m.axis_iter_mut(Axis(0)) {
            z.assign(&ring());
        }
        let mut seed_only = m.clone();
        fill_holes(&mut seed_only, HoleFilling::SeedSlice, Some(1));
        assert_eq!(seed_only[(0, 3, 3)], 0);
        assert_eq!(seed_only[(1, 3, 3)], 1);
        assert_eq!(seed_only[(2, 3, 3)], 0);

        let mut all = m.clone();
        fill_holes(&mut all, HoleFilling::AllSlices, None);
        assert!((0..3).all(|z| all[(z, 3, 3)] == 1));

        let mut none = m.clone();
        fill_holes(&mut none, HoleFilling::None, Some(1));
        assert_eq!(none, m);
    }
}
