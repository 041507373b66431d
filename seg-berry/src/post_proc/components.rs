//! 三维连通域过滤.

use std::collections::VecDeque;

use ndarray::Array3;

use crate::consts::gray::{SEG_BACKGROUND, SEG_FOREGROUND};
use crate::data::neighbour6;

/// 删除体素数少于 `min_voxels` 的 6-连通前景分量, 并将结果截断为 `{0, 1}`.
///
/// 返回被删除的体素总数.
pub fn remove_small_components(mask: &mut Array3<u8>, min_voxels: usize) -> usize {
    mask.mapv_inplace(|v| u8::from(v != SEG_BACKGROUND));
    let mut visited = Array3::<bool>::from_elem(mask.dim(), false);
    let mut queue = VecDeque::new();
    let mut component = Vec::new();
    let mut removed = 0;

    let seeds: Vec<_> = mask
        .indexed_iter()
        .filter(|(_, v)| **v == SEG_FOREGROUND)
        .map(|(p, _)| p)
        .collect();
    for start in seeds {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        component.clear();
        while let Some(pos) = queue.pop_front() {
            component.push(pos);
            for n in neighbour6(pos) {
                // 越界的邻居 `get` 返回 `None`.
                if mask.get(n) == Some(&SEG_FOREGROUND) && !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }
        if component.len() < min_voxels {
            removed += component.len();
            for &p in component.iter() {
                mask[p] = SEG_BACKGROUND;
            }
        }
    }
    if removed > 0 {
        log::debug!("removed {removed} voxels in small components");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    #[test]
    fn test_small_components_removed() {
        let mut m = Array3::<u8>::zeros((4, 8, 8));
        // 27 体素的块.
        m.slice_mut(s![0..3, 0..3, 0..3]).fill(1);
        // 2 体素的小块.
        m[(3, 7, 7)] = 1;
        m[(3, 7, 6)] = 1;
        // 对角相邻不算 6-连通.
        m[(3, 5, 5)] = 1;
        m[(2, 4, 4)] = 255;

        let removed = remove_small_components(&mut m, 10);
        assert_eq!(removed, 4);
        assert_eq!(m.iter().filter(|v| **v == 1).count(), 27);
        assert!(m.iter().all(|v| *v <= 1));
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut m = Array3::<u8>::zeros((1, 1, 12));
        m.slice_mut(s![.., .., 0..10]).fill(1);
        assert_eq!(remove_small_components(&mut m, 10), 0);
        assert_eq!(remove_small_components(&mut m, 11), 10);
        assert!(m.iter().all(|v| *v == 0));
    }
}
