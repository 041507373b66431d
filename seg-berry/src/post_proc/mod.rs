//! 后处理: 小连通域过滤, 空洞填充, 以及分割质量指标.

pub mod components;
pub mod holes;
pub mod metrics;

use ndarray::Array3;

use crate::config::PostConfig;
use crate::data::SeedSet;

pub use components::remove_small_components;
pub use holes::{fill_holes, fill_holes_2d};
pub use metrics::{compute_metrics, Metrics};

/// 完整后处理流程. `seeds` 为全局坐标, 空洞填充以第一个前景种子的切片为准.
///
/// 返回被删除的小分量体素数.
pub fn post_process(mask: &mut Array3<u8>, seeds: &SeedSet, cfg: &PostConfig) -> usize {
    let removed = remove_small_components(mask, cfg.min_component);
    let seed_slice = seeds.first_foreground().map(|s| s.pos.0);
    fill_holes(mask, cfg.hole_filling, seed_slice);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HoleFilling;
    use ndarray::s;

    #[test]
    fn test_pipeline() {
        let mut m = Array3::<u8>::zeros((3, 9, 9));
        m.slice_mut(s![.., 2..7, 2..7]).fill(1);
        m[(1, 4, 4)] = 0;
        m[(2, 4, 4)] = 0;
        m[(0, 0, 8)] = 1;
        let seeds = SeedSet::from_points(&[(1, 3, 3)], &[], 7.0);
        let removed = post_process(&mut m, &seeds, &PostConfig::default());
        assert_eq!(removed, 1);
        assert_eq!(m[(1, 4, 4)], 1);
        // 仅处理种子所在切片.
        assert_eq!(m[(2, 4, 4)], 0);

        let cfg = PostConfig {
            hole_filling: HoleFilling::AllSlices,
            ..Default::default()
        };
        post_process(&mut m, &seeds, &cfg);
        assert_eq!(m[(2, 4, 4)], 1);
    }
}
