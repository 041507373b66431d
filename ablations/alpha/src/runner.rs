//! 程序运行函数.

use std::thread;

use seg_berry::config::EnergyWindow;
use seg_berry::prelude::*;

use crate::profile::Profile;
use crate::result::AblationResult;

/// 一组待比较的参数.
#[derive(Copy, Clone, Debug)]
pub struct Setting {
    /// 相邻项系数.
    pub alpha: i32,
    /// 一元能量截断窗口.
    pub window: EnergyWindow,
}

impl Setting {
    /// 展示名.
    pub fn name(&self) -> String {
        format!(
            "alpha={} window=[{}, {}]",
            self.alpha, self.window.min_window, self.window.max_window
        )
    }
}

/// 单个病例: 体数据, 参考掩码, 包围盒, 种子.
pub struct Case {
    volume: Volume,
    reference: ndarray::Array3<u8>,
    bbox: Option<BBox>,
    fg: Vec<Idx3d>,
    bg: Vec<Idx3d>,
}

impl Case {
    /// 以参考掩码外扩 `MARGIN` 的范围为包围盒, 背景种子取包围盒的两个角点.
    pub fn new(volume: Volume, reference: ndarray::Array3<u8>, fg: Idx3d) -> Self {
        const MARGIN: usize = 4;
        let shape = volume.shape();
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        for ((z, y, x), _) in reference.indexed_iter().filter(|(_, v)| **v != 0) {
            for (i, c) in [z, y, x].into_iter().enumerate() {
                lo[i] = lo[i].min(c);
                hi[i] = hi[i].max(c + 1);
            }
        }
        let dims = [shape.0, shape.1, shape.2];
        let lo = [0, 1, 2].map(|i| lo[i].min(dims[i]).saturating_sub(MARGIN));
        let hi = [0, 1, 2].map(|i| (hi[i] + MARGIN).min(dims[i]));
        let bbox = BBox::new([lo[0], lo[1], lo[2], hi[0], hi[1], hi[2]], shape).ok();
        let bg = match bbox {
            Some(_) => vec![(fg.0, lo[1], lo[2]), (fg.0, hi[1] - 1, hi[2] - 1)],
            None => Vec::new(),
        };
        Self {
            volume,
            reference,
            bbox,
            fg: vec![fg],
            bg,
        }
    }
}

/// 合成病例. 前景种子取体模中心, 背景种子取角落.
pub fn phantom_cases() -> Vec<Case> {
    [(0.0, (16, 48, 48)), (20.0, (16, 48, 48)), (60.0, (20, 64, 40))]
        .into_iter()
        .map(|(noise, shape)| {
            let (volume, reference) = utils::ellipsoid_phantom(shape, 220.0, 60.0, noise);
            let (d, h, w) = shape;
            Case {
                volume,
                reference,
                bbox: None,
                fg: vec![(d / 2, h / 2, w / 2), (d / 2, h / 2 + 2, w / 2)],
                bg: vec![(d / 2, 1, 1), (d / 2, h - 2, w - 2)],
            }
        })
        .collect()
}

/// 用给定参数跑完所有病例.
fn run_setting(s: Setting, cases: &[Case]) -> Profile {
    let mut profile = Profile::new();
    for case in cases.iter() {
        let mut cfg = SegConfig::default();
        cfg.graph_cut.pairwise_alpha = s.alpha;
        cfg.graph_cut.energy = s.window;
        let mut engine = match SegEngine::new(case.volume.clone(), cfg) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("{}: {e}", s.name());
                profile.count_failed();
                continue;
            }
        };
        let seeds = engine.seeds(&case.fg, &case.bg);

        profile.target_start();
        let outcome = engine.run(Algorithm::GraphCut3d, case.bbox, &seeds);
        let dice = outcome.and_then(|o| {
            engine.state_mut().attach_reference(case.reference.clone())?;
            let bbox = BBox::whole(case.volume.shape())?;
            engine.state().metrics(&bbox).map(|m| (m.dice, o.foreground))
        });
        match dice {
            Ok((dice, foreground)) => profile.target_elapsed(dice, foreground),
            Err(e) => {
                log::warn!("{}: {e}", s.name());
                profile.count_failed();
            }
        }
    }
    profile.finish()
}

/// 实际运行. 每组参数一个线程.
pub fn run(settings: &[Setting], cases: &[Case]) -> AblationResult {
    log::info!(
        "running {} settings over {} cases on {} cpus",
        settings.len(),
        cases.len(),
        utils::cpus()
    );
    thread::scope(|sc| {
        let handles: Vec<_> = settings
            .iter()
            .map(|&s| (s.name(), sc.spawn(move || run_setting(s, cases))))
            .collect();
        handles
            .into_iter()
            .map(|(name, h)| (name, h.join().expect("Thread joining error")))
            .collect()
    })
}
