//! 三维图割: 一元项来自统计模型, 相邻项为 6-邻接的 Potts 惩罚.

use std::time::Instant;

use ndarray::{Array2, Array3, ArrayView3};

use crate::algo::Segmenter;
use crate::config::{GraphCutConfig, ModelConfig};
use crate::consts::gray::{SEED_BACKGROUND, SEED_FOREGROUND};
use crate::data::{BBox, SeedSet, Volume};
use crate::error::{SegError, SegResult};
use crate::model::SeedModel;

pub mod maxflow;

pub use maxflow::{Dinic, Edge, MinCut};

/// 相邻项策略.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PairwiseTerm {
    /// 每条边固定惩罚 `alpha`.
    Constant(i32),

    /// 按灰度差衰减: `alpha * exp(-(Ip - Iq)^2 / (2 sigma^2))`.
    BoundaryPenalty {
        /// 最大惩罚.
        alpha: i32,
        /// 灰度尺度.
        sigma: f64,
    },
}

impl PairwiseTerm {
    /// 由配置选择策略.
    pub fn from_config(cfg: &GraphCutConfig) -> Self {
        if cfg.use_boundary_penalties {
            Self::BoundaryPenalty {
                alpha: cfg.pairwise_alpha,
                sigma: cfg.boundary_sigma,
            }
        } else {
            Self::Constant(cfg.pairwise_alpha)
        }
    }

    /// 单条边的最大可能惩罚.
    #[inline]
    pub fn max_weight(&self) -> i32 {
        match *self {
            Self::Constant(a) | Self::BoundaryPenalty { alpha: a, .. } => a.max(0),
        }
    }

    /// 两个相邻体素之间的惩罚.
    #[inline]
    fn weight(&self, ip: f32, iq: f32) -> i32 {
        match *self {
            Self::Constant(a) => a.max(0),
            Self::BoundaryPenalty { alpha, sigma } => {
                let d = (ip - iq) as f64;
                let s2 = 2.0 * sigma.max(f64::EPSILON).powi(2);
                (alpha.max(0) as f64 * (-d * d / s2).exp()).round() as i32
            }
        }
    }
}

/// 子体内所有 6-邻接边, 权重由 `term` 决定.
pub fn grid_edges(patch: ArrayView3<f32>, term: &PairwiseTerm) -> Vec<Edge> {
    let (d, h, w) = patch.dim();
    let idx = |z: usize, y: usize, x: usize| (z * h + y) * w + x;
    let mut edges = Vec::with_capacity(3 * d * h * w);
    for ((z, y, x), &v) in patch.indexed_iter() {
        let here = idx(z, y, x);
        let mut push = |q: (usize, usize, usize)| {
            edges.push(Edge {
                a: here,
                b: idx(q.0, q.1, q.2),
                weight: term.weight(v, patch[q]),
            });
        };
        if z + 1 < d {
            push((z + 1, y, x));
        }
        if y + 1 < h {
            push((z, y + 1, x));
        }
        if x + 1 < w {
            push((z, y, x + 1));
        }
    }
    edges
}

/// 组装 `[V, 2]` 一元代价: 第 0 列为背景代价, 第 1 列为前景代价.
///
/// 能量先截断到 `[min_window, max_window]`, 种子体素再施加硬约束:
/// 前景种子的前景代价为 0, 背景代价为 `hard`; 背景种子反之.
pub fn unary_costs(
    bg: &Array3<f64>,
    fg: &Array3<f64>,
    seed_map: &Array3<u8>,
    cfg: &GraphCutConfig,
    hard: i32,
) -> Array2<i32> {
    let n = bg.len();
    let w = cfg.energy;
    let mut unary = Array2::<i32>::zeros((n, 2));
    let rows = bg.iter().zip(fg.iter()).zip(seed_map.iter());
    for (mut row, ((&b, &f), &s)) in unary.rows_mut().into_iter().zip(rows) {
        let (cb, cf) = match s {
            SEED_FOREGROUND => (hard, 0),
            SEED_BACKGROUND => (0, hard),
            _ => (w.clamp(b).round() as i32, w.clamp(f).round() as i32),
        };
        row[0] = cb;
        row[1] = cf;
    }
    unary
}

/// 图割分割器.
#[derive(Debug)]
pub struct GraphCut<M: MinCut = Dinic> {
    cfg: GraphCutConfig,
    model_cfg: ModelConfig,
    solver: M,
}

impl GraphCut<Dinic> {
    /// 使用默认最小割实现.
    pub fn new(cfg: GraphCutConfig, model_cfg: ModelConfig) -> Self {
        Self::with_solver(cfg, model_cfg, Dinic::default())
    }
}

impl<M: MinCut> GraphCut<M> {
    /// 使用自定义最小割实现.
    pub fn with_solver(cfg: GraphCutConfig, model_cfg: ModelConfig, solver: M) -> Self {
        Self {
            cfg,
            model_cfg,
            solver,
        }
    }

    /// 硬约束代价. 严格大于能量上界与一个体素全部相邻项之和,
    /// 使任何标签翻转都无法抵消违反种子的代价.
    pub fn hard_cost(&self, term: &PairwiseTerm) -> i32 {
        let max = self.cfg.energy.max_window.round() as i64;
        let bound = max + 1 + 6 * i64::from(term.max_weight());
        bound.min(i64::from(i32::MAX)) as i32
    }

    /// 对子体做图割. `seeds` 为局部坐标, 调用方保证两类各至少一个.
    pub fn cut_patch(&mut self, patch: ArrayView3<f32>, seeds: &SeedSet) -> SegResult<Array3<u8>> {
        let mut model = SeedModel::new(self.model_cfg.clone());
        model.fit_seeds(patch, seeds);
        let (bg, fg) = model
            .energies(patch, None)
            .ok_or(SegError::InsufficientSeeds {
                foreground: seeds.foreground.len(),
                background: seeds.background.len(),
            })?;

        let term = PairwiseTerm::from_config(&self.cfg);
        let seed_map = seeds.label_map(patch.dim());
        let unary = unary_costs(&bg, &fg, &seed_map, &self.cfg, self.hard_cost(&term));
        let edges = grid_edges(patch, &term);
        // 权重已按边给出, 矩阵只表达 Potts 结构.
        let labels = self
            .solver
            .cut_from_graph(&edges, unary.view(), [[0, 1], [1, 0]])?;
        Ok(Array3::from_shape_vec(patch.dim(), labels)?)
    }
}

impl<M: MinCut> Segmenter for GraphCut<M> {
    fn segment(&mut self, volume: &Volume, bbox: &BBox, seeds: &SeedSet) -> SegResult<Array3<u8>> {
        let t = Instant::now();
        let patch = volume.patch(bbox);
        let local = seeds.to_local(bbox);
        let out = self.cut_patch(patch, &local)?;
        log::info!(
            "graph cut on patch {:?} finished in {} ms",
            bbox.shape(),
            t.elapsed().as_millis()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnergyWindow;
    use crate::data::VoxelGeometry;

    /// 中心亮块 + 暗背景.
    fn volume() -> Volume {
        let data = Array3::from_shape_fn((10, 20, 20), |(z, y, x)| {
            let inside = (2..8).contains(&z) && (6..14).contains(&y) && (6..14).contains(&x);
            if inside {
                300.0 + ((x + y) % 4) as f32
            } else {
                50.0 + ((x * y + z) % 5) as f32
            }
        });
        Volume::new(data, [1.0, 1.0, 1.0], "phantom")
    }

    #[test]
    fn test_grid_edges() {
        let p = Array3::<f32>::zeros((2, 3, 4));
        let e = grid_edges(p.view(), &PairwiseTerm::Constant(7));
        // (D-1)HW + D(H-1)W + DH(W-1)
        assert_eq!(e.len(), 12 + 16 + 18);
        assert!(e.iter().all(|e| e.weight == 7 && e.a < e.b));
    }

    #[test]
    fn test_boundary_penalty_weights() {
        let t = PairwiseTerm::BoundaryPenalty {
            alpha: 20,
            sigma: 10.0,
        };
        assert_eq!(t.weight(5.0, 5.0), 20);
        assert!(t.weight(0.0, 100.0) < 1);
        assert_eq!(t.max_weight(), 20);
    }

    #[test]
    fn test_unary_hard_constraints() {
        let bg = Array3::from_elem((1, 1, 3), 5000.0);
        let fg = Array3::from_elem((1, 1, 3), -3.0);
        let mut seeds = Array3::<u8>::zeros((1, 1, 3));
        seeds[(0, 0, 0)] = SEED_FOREGROUND;
        seeds[(0, 0, 1)] = SEED_BACKGROUND;
        let u = unary_costs(&bg, &fg, &seeds, &GraphCutConfig::default(), 1121);
        assert_eq!(u.row(0).to_vec(), vec![1121, 0]);
        assert_eq!(u.row(1).to_vec(), vec![0, 1121]);
        // 截断到 [0, 1000].
        assert_eq!(u.row(2).to_vec(), vec![1000, 0]);
    }

    #[test]
    fn test_graph_cut_end_to_end() {
        let v = volume();
        let bbox = BBox::new([0, 0, 0, 10, 20, 20], v.shape()).unwrap();
        // 种子覆盖两类区域内出现的全部灰度.
        let fg = [(5, 8, 8), (5, 8, 9), (5, 8, 10), (5, 8, 11), (3, 10, 10), (6, 12, 7)];
        let bg = [(5, 0, 0), (5, 2, 3), (5, 1, 2), (5, 1, 3), (5, 2, 2), (5, 18, 18)];
        let seeds = SeedSet::from_points(&fg, &bg, 7.0);
        let mut gc = GraphCut::new(GraphCutConfig::default(), ModelConfig::default());
        let out = gc.segment(&v, &bbox, &seeds).unwrap();
        assert_eq!(out.dim(), (10, 20, 20));

        let inside = |z: usize, y: usize, x: usize| {
            (2..8).contains(&z) && (6..14).contains(&y) && (6..14).contains(&x)
        };
        let block: Vec<u8> = out
            .indexed_iter()
            .filter(|((z, y, x), _)| inside(*z, *y, *x))
            .map(|(_, v)| *v)
            .collect();
        let hit = block.iter().filter(|v| **v == 1).count();
        assert_eq!(block.len(), 6 * 8 * 8);
        assert!(hit * 100 >= block.len() * 95, "{hit} of {}", block.len());

        // 离亮块两个体素以上的背景全部为 0.
        let far = |z: usize, y: usize, x: usize| {
            !((1..9).contains(&z) && (5..15).contains(&y) && (5..15).contains(&x))
        };
        assert!(out
            .indexed_iter()
            .filter(|((z, y, x), _)| far(*z, *y, *x))
            .all(|(_, v)| *v == 0));
    }

    #[test]
    fn test_seeds_hold_for_any_alpha() {
        let v = volume();
        let bbox = BBox::new([1, 3, 3, 9, 17, 17], v.shape()).unwrap();
        // 故意把一个前景种子放在暗区, 一个背景种子放在亮区.
        let seeds = SeedSet::from_points(&[(5, 10, 10), (4, 4, 4)], &[(5, 4, 16), (3, 9, 9)], 7.0);
        let windows = [EnergyWindow::default(), EnergyWindow::wide()];
        for (alpha, energy) in itertools::iproduct!([0, 1, 20, 500, 100_000], windows) {
            let cfg = GraphCutConfig {
                pairwise_alpha: alpha,
                energy,
                ..Default::default()
            };
            let mut gc = GraphCut::new(cfg, ModelConfig::default());
            let out = gc.segment(&v, &bbox, &seeds).unwrap();
            for s in seeds.foreground.iter() {
                assert_eq!(out[bbox.to_local(s.pos)], 1, "alpha {alpha}");
            }
            for s in seeds.background.iter() {
                assert_eq!(out[bbox.to_local(s.pos)], 0, "alpha {alpha}");
            }
        }
    }
}
