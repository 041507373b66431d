//! 算法目录与分割引擎.
//!
//! 所有算法实现同一个 [`Segmenter`] 接口, 由 [`Algorithm`] 枚举分派.
//! 引擎在完整流程成功后才一次性发布结果.

use std::fmt;
use std::time::{Duration, Instant};

use ndarray::{s, Array3};

use crate::config::SegConfig;
use crate::data::{BBox, SegState, SeedSet, Volume, VoxelGeometry};
use crate::error::{SegError, SegResult};
use crate::graph_cut::{Dinic, GraphCut, MinCut};
use crate::guide::GuideKind;
use crate::post_proc::post_process;
use crate::remote::{DinAdapter, PredictionService, TfServingRest};
use crate::walker::RandomWalker;
use crate::Idx3d;

/// 分割算法接口.
pub trait Segmenter {
    /// 在 `bbox` 内分割, 返回与包围盒同形状的二值图 (1 为前景).
    /// `seeds` 为全局坐标.
    fn segment(&mut self, volume: &Volume, bbox: &BBox, seeds: &SeedSet) -> SegResult<Array3<u8>>;
}

/// 可用的分割算法.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Algorithm {
    /// 远程 DIN 推理, 附带引导图类型.
    Din(GuideKind),

    /// 外部三维随机游走.
    RandomWalk3d,

    /// 三维图割.
    GraphCut3d,
}

impl Algorithm {
    /// 全部算法.
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Din(GuideKind::Exponential),
        Algorithm::Din(GuideKind::Euclidean),
        Algorithm::Din(GuideKind::Geodesic),
        Algorithm::RandomWalk3d,
        Algorithm::GraphCut3d,
    ];

    /// 算法名. DIN 的算法名同时是远程模型名.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Din(GuideKind::Exponential) => "din-exp",
            Self::Din(GuideKind::Euclidean) => "din-euc",
            Self::Din(GuideKind::Geodesic) => "din-geo",
            Self::RandomWalk3d => "random-walk-3d",
            Self::GraphCut3d => "graph-cut-3d",
        }
    }

    /// 由算法名解析.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// 结果是否经过后处理. 只有网络推理的输出需要去噪和补洞,
    /// 经典算法的结果原样发布, 种子处的标签因此保持不变.
    #[inline]
    pub fn post_processed(&self) -> bool {
        matches!(self, Self::Din(_))
    }

    /// 所需的 `(前景, 背景)` 种子最少个数.
    pub fn required_seeds(&self) -> (usize, usize) {
        match self {
            Self::Din(_) => (1, 0),
            Self::RandomWalk3d | Self::GraphCut3d => (1, 1),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一次成功分割的摘要.
#[derive(Copy, Clone, Debug)]
pub struct SegOutcome {
    /// 使用的算法.
    pub algorithm: Algorithm,
    /// 状态码, 成功时为 0.
    pub status: i32,
    /// 后处理删除的小分量体素数. 未经后处理时为 0.
    pub removed: usize,
    /// 前景体素数.
    pub foreground: usize,
    /// 耗时.
    pub elapsed: Duration,
}

/// 分割引擎. 独占会话状态和各算法实例.
pub struct SegEngine<S: PredictionService = TfServingRest, M: MinCut = Dinic> {
    state: SegState,
    cfg: SegConfig,
    din: DinAdapter<S>,
    walker: RandomWalker,
    graph_cut: GraphCut<M>,
}

impl SegEngine<TfServingRest, Dinic> {
    /// 使用默认组件: TensorFlow Serving, 外部随机游走程序, Dinic 最小割.
    pub fn new(volume: Volume, cfg: SegConfig) -> SegResult<Self> {
        let din = DinAdapter::connect(cfg.remote.clone(), cfg.guide.clone())?;
        let graph_cut = GraphCut::new(cfg.graph_cut.clone(), cfg.model.clone());
        Self::with_parts(volume, cfg, din, graph_cut)
    }
}

impl<S: PredictionService, M: MinCut> SegEngine<S, M> {
    /// 组装自定义组件. `cfg` 无效时返回 [`SegError::Config`].
    pub fn with_parts(
        volume: Volume,
        cfg: SegConfig,
        din: DinAdapter<S>,
        graph_cut: GraphCut<M>,
    ) -> SegResult<Self> {
        cfg.validate()?;
        let state = SegState::new(volume).with_style((&cfg.render).into());
        let walker = RandomWalker::new(&cfg.walker);
        Ok(Self {
            state,
            cfg,
            din,
            walker,
            graph_cut,
        })
    }

    /// 会话状态.
    #[inline]
    pub fn state(&self) -> &SegState {
        &self.state
    }

    /// 可变会话状态 (窗口, 清除, 撤销, 参考掩码).
    #[inline]
    pub fn state_mut(&mut self) -> &mut SegState {
        &mut self.state
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &SegConfig {
        &self.cfg
    }

    /// DIN 适配器.
    #[inline]
    pub fn din(&self) -> &DinAdapter<S> {
        &self.din
    }

    /// 替换随机游走程序.
    pub fn set_walker(&mut self, walker: RandomWalker) {
        self.walker = walker;
    }

    /// 用配置中的默认标准差构建种子集合.
    pub fn seeds(&self, fg: &[Idx3d], bg: &[Idx3d]) -> SeedSet {
        SeedSet::from_points(fg, bg, self.cfg.guide.default_stddev)
    }

    /// 运行一次分割. `bbox` 为 `None` 时使用整个体数据.
    ///
    /// 任何一步失败时分割缓存保持不变.
    pub fn run(&mut self, algorithm: Algorithm, bbox: Option<BBox>, seeds: &SeedSet) -> SegResult<SegOutcome> {
        let t = Instant::now();
        let volume = self.state.volume();
        let shape = volume.shape();
        let bbox = match bbox {
            Some(b) if b.fits(shape) => b,
            Some(b) => return Err(SegError::InvalidBox(b.coords())),
            None => BBox::whole(shape)?,
        };
        let (min_fg, min_bg) = algorithm.required_seeds();
        seeds.require(min_fg, min_bg)?;
        seeds.check_within(&bbox)?;
        log::info!(
            "{algorithm}: bbox {:?}, {} fg / {} bg seeds",
            bbox.coords(),
            seeds.foreground.len(),
            seeds.background.len()
        );

        let labels = match algorithm {
            Algorithm::Din(kind) => {
                self.din.set_guide(kind);
                self.din.segment(volume, &bbox, seeds)?
            }
            Algorithm::RandomWalk3d => self.walker.segment(volume, &bbox, seeds)?,
            Algorithm::GraphCut3d => self.graph_cut.segment(volume, &bbox, seeds)?,
        };
        if labels.dim() != bbox.shape() {
            return Err(SegError::ShapeMismatch {
                reference: bbox.shape(),
                prediction: labels.dim(),
            });
        }

        let [z1, y1, x1, z2, y2, x2] = bbox.coords();
        let mut full = Array3::<u8>::zeros(shape);
        full.slice_mut(s![z1..z2, y1..y2, x1..x2]).assign(&labels);
        let removed = if algorithm.post_processed() {
            post_process(&mut full, seeds, &self.cfg.post)
        } else {
            full.mapv_inplace(|v| u8::from(v != 0));
            0
        };
        let foreground = full.iter().filter(|v| **v != 0).count();
        self.state.publish(full)?;

        let elapsed = t.elapsed();
        log::info!(
            "{algorithm}: {foreground} foreground voxels, {removed} pruned, {} ms",
            elapsed.as_millis()
        );
        Ok(SegOutcome {
            algorithm,
            status: 0,
            removed,
            foreground,
            elapsed,
        })
    }

    /// 运行一次分割, 只返回交互端使用的状态码.
    pub fn run_status(&mut self, algorithm: Algorithm, bbox: Option<BBox>, seeds: &SeedSet) -> i32 {
        match self.run(algorithm, bbox, seeds) {
            Ok(o) => o.status,
            Err(e) => {
                log::warn!("{algorithm} failed: {e}");
                e.status_code()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use ndarray::{Array4, ArrayView3, ArrayView4};

    /// 总是预测前景引导值更大的一侧.
    struct GuideEcho;

    impl PredictionService for GuideEcho {
        fn predict(&self, _: &str, _: ArrayView3<f32>, guide: ArrayView4<f32>) -> SegResult<Array4<f32>> {
            let (d, h, w, _) = guide.dim();
            Ok(Array4::from_shape_fn((d, h, w, 2), |(z, y, x, c)| {
                guide[(z, y, x, 1 - c)]
            }))
        }
    }

    struct Offline;

    impl PredictionService for Offline {
        fn predict(&self, _: &str, _: ArrayView3<f32>, _: ArrayView4<f32>) -> SegResult<Array4<f32>> {
            Err(SegError::Transport("connection refused".into()))
        }
    }

    fn phantom() -> Volume {
        let data = Array3::from_shape_fn((10, 20, 20), |(z, y, x)| {
            let inside = (2..8).contains(&z) && (6..14).contains(&y) && (6..14).contains(&x);
            if inside {
                300.0
            } else {
                50.0
            }
        });
        Volume::new(data, [2.5, 0.8, 0.8], "phantom")
    }

    fn engine_on<S: PredictionService>(volume: Volume, svc: S) -> SegEngine<S> {
        let cfg = SegConfig::default();
        let din = DinAdapter::new(svc, RemoteConfig::default(), cfg.guide.clone());
        let gc = GraphCut::new(cfg.graph_cut.clone(), cfg.model.clone());
        let mut e = SegEngine::with_parts(volume, cfg, din, gc).unwrap();
        e.set_walker(RandomWalker::with_executable("/nonexistent/RandomWalk-3D"));
        e
    }

    fn engine<S: PredictionService>(svc: S) -> SegEngine<S> {
        engine_on(phantom(), svc)
    }

    #[test]
    fn test_names() {
        for a in Algorithm::ALL {
            assert_eq!(Algorithm::from_name(a.name()), Some(a));
        }
        assert_eq!(Algorithm::from_name("din-foo"), None);
        assert_eq!(Algorithm::Din(GuideKind::Geodesic).to_string(), "din-geo");
        assert!(Algorithm::Din(GuideKind::Euclidean).post_processed());
        assert!(!Algorithm::GraphCut3d.post_processed());
        assert!(!Algorithm::RandomWalk3d.post_processed());
    }

    #[test]
    fn test_graph_cut_on_noise_keeps_seed_labels() {
        // 碎片化的图割结果不经过小分量过滤, 种子处标签保持不变.
        let data = Array3::from_shape_fn((10, 20, 20), |(z, y, x)| {
            ((x * 7 + y * 13 + z * 5) % 17) as f32 * 10.0
        });
        let volume = Volume::new(data, [1.0, 1.0, 1.0], "noise");
        let mut e = engine_on(volume.clone(), GuideEcho);
        let bbox = BBox::whole((10, 20, 20)).unwrap();
        let seeds = e.seeds(&[(5, 10, 10)], &[(5, 2, 2)]);

        let cfg = e.config().clone();
        let raw = GraphCut::new(cfg.graph_cut, cfg.model)
            .segment(&volume, &bbox, &seeds)
            .unwrap();
        let out = e.run(Algorithm::GraphCut3d, Some(bbox), &seeds).unwrap();
        let seg = e.state().cache().to_dense((10, 20, 20));
        assert_eq!(out.removed, 0);
        assert_eq!(seg, raw);
        assert_eq!(out.foreground, raw.iter().filter(|v| **v == 1).count());
        assert_eq!(seg[(5, 10, 10)], 1);
        assert_eq!(seg[(5, 2, 2)], 0);
    }

    #[test]
    fn test_with_parts_rejects_invalid_config() {
        let mut cfg = SegConfig::default();
        cfg.graph_cut.energy.min_window = 10.0;
        cfg.graph_cut.energy.max_window = 1.0;
        let din = DinAdapter::new(GuideEcho, RemoteConfig::default(), cfg.guide.clone());
        let gc = GraphCut::new(cfg.graph_cut.clone(), cfg.model.clone());
        let err = SegEngine::with_parts(phantom(), cfg, din, gc).err().unwrap();
        assert!(matches!(err, SegError::Config(_)));
    }

    #[test]
    fn test_graph_cut_end_to_end() {
        // 其他测试可能已设置 logger.
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
        let mut e = engine(GuideEcho);
        let bbox = BBox::new([0, 0, 0, 10, 20, 20], (10, 20, 20)).unwrap();
        let seeds = e.seeds(&[(5, 10, 10)], &[(5, 2, 2)]);
        let out = e.run(Algorithm::GraphCut3d, Some(bbox), &seeds).unwrap();
        assert_eq!(out.status, 0);
        assert_eq!(out.foreground, 6 * 8 * 8);

        let seg = e.state().cache().to_dense((10, 20, 20));
        assert_eq!(seg.dim(), (10, 20, 20));
        assert_eq!(seg[(5, 10, 10)], 1);
        assert_eq!(seg[(5, 2, 2)], 0);
    }

    #[test]
    fn test_insufficient_seeds_leave_cache() {
        let mut e = engine(GuideEcho);
        let seeds = e.seeds(&[(5, 10, 10)], &[(5, 2, 2)]);
        e.run(Algorithm::GraphCut3d, None, &seeds).unwrap();
        let before = e.state().cache().clone();

        let fg_only = e.seeds(&[(5, 10, 10)], &[]);
        assert_eq!(e.run_status(Algorithm::GraphCut3d, None, &fg_only), 1);
        assert_eq!(e.run_status(Algorithm::RandomWalk3d, None, &fg_only), 1);
        assert_eq!(e.state().cache(), &before);
    }

    #[test]
    fn test_unavailable_backends_are_recoverable() {
        let mut e = engine(Offline);
        let seeds = e.seeds(&[(5, 10, 10)], &[(5, 2, 2)]);
        assert_eq!(e.run_status(Algorithm::Din(GuideKind::Exponential), None, &seeds), 1);
        assert_eq!(e.run_status(Algorithm::RandomWalk3d, None, &seeds), 1);
        assert!(e.state().cache().is_empty());
    }

    #[test]
    fn test_din_publishes_into_box() {
        let mut e = engine(GuideEcho);
        let bbox = BBox::new([3, 4, 4, 7, 16, 16], (10, 20, 20)).unwrap();
        let seeds = e.seeds(&[(5, 10, 10)], &[(5, 5, 5)]);
        e.run(Algorithm::Din(GuideKind::Exponential), Some(bbox), &seeds).unwrap();
        let seg = e.state().cache().to_dense((10, 20, 20));
        assert_eq!(seg[(5, 10, 10)], 1);
        // 包围盒外全为背景.
        assert!(seg.slice(s![..3, .., ..]).iter().all(|v| *v == 0));
        assert_eq!(e.din().cache().stats(), (0, 1));
    }

    #[test]
    fn test_seed_outside_box() {
        let mut e = engine(GuideEcho);
        let bbox = BBox::new([0, 0, 0, 4, 4, 4], (10, 20, 20)).unwrap();
        let seeds = e.seeds(&[(5, 10, 10)], &[(1, 1, 1)]);
        let err = e.run(Algorithm::GraphCut3d, Some(bbox), &seeds).unwrap_err();
        assert!(matches!(err, SegError::SeedOutsideBox((5, 10, 10))));
    }

    #[test]
    fn test_metrics_after_run() {
        let mut e = engine(GuideEcho);
        let reference = e.state().volume().data().mapv(|v| u8::from(v > 100.0));
        e.state_mut().attach_reference(reference).unwrap();
        let seeds = e.seeds(&[(5, 10, 10)], &[(5, 2, 2)]);
        e.run(Algorithm::GraphCut3d, None, &seeds).unwrap();
        let m = e.state().metrics(&BBox::whole((10, 20, 20)).unwrap()).unwrap();
        assert_eq!(m.dice, 1.0);
        assert_eq!(m.relative_volume_difference, 0.0);
    }
}
