//! 按类别的灰度统计模型. 由种子处灰度拟合, 输出逐体素的负对数似然.

use ndarray::{Array3, ArrayView3, Zip};

use crate::config::{EnergyWindow, ModelConfig};
use crate::consts::{ElemType, LIKELIHOOD_SCALE};
use crate::data::SeedSet;

pub mod gmm;

pub use gmm::Gmm1d;

/// 前景/背景的灰度混合模型.
#[derive(Clone, Debug)]
pub struct SeedModel {
    cfg: ModelConfig,
    foreground: Option<Gmm1d>,
    background: Option<Gmm1d>,
}

/// 一元能量对 `(背景, 前景)`.
pub type EnergyPair = (Array3<f64>, Array3<f64>);

impl SeedModel {
    /// 创建尚未拟合的模型.
    pub fn new(cfg: ModelConfig) -> Self {
        Self {
            cfg,
            foreground: None,
            background: None,
        }
    }

    /// 用给定样本拟合某一类. 样本为空时清除该类模型并返回 `false`.
    pub fn fit(&mut self, class: ElemType, samples: &[f64]) -> bool {
        let g = Gmm1d::fit(
            samples,
            self.cfg.components,
            self.cfg.max_iterations,
            self.cfg.tolerance,
        );
        let fitted = g.is_some();
        match class {
            ElemType::Foreground => self.foreground = g,
            ElemType::Background => self.background = g,
        }
        fitted
    }

    /// 以局部种子处的灰度拟合两类模型. 返回成功拟合的类别数.
    pub fn fit_seeds(&mut self, patch: ArrayView3<f32>, seeds: &SeedSet) -> usize {
        [ElemType::Foreground, ElemType::Background]
            .into_iter()
            .filter(|&class| {
                let samples: Vec<f64> = seeds
                    .of(class)
                    .iter()
                    .filter_map(|s| patch.get(s.pos))
                    .map(|v| *v as f64)
                    .collect();
                self.fit(class, &samples)
            })
            .count()
    }

    /// 获取某类的模型.
    #[inline]
    pub fn class_model(&self, class: ElemType) -> Option<&Gmm1d> {
        match class {
            ElemType::Foreground => self.foreground.as_ref(),
            ElemType::Background => self.background.as_ref(),
        }
    }

    /// 截断窗口.
    #[inline]
    pub fn window(&self) -> &EnergyWindow {
        &self.cfg.energy
    }

    /// 逐体素 `-10 * log p(x | class)`, 截断到能量窗口内.
    ///
    /// 该类尚未拟合时返回 `None`.
    pub fn likelihood(&self, patch: ArrayView3<f32>, class: ElemType) -> Option<Array3<f64>> {
        let g = self.class_model(class)?;
        let w = self.cfg.energy;
        Some(patch.mapv(|x| {
            let e = -LIKELIHOOD_SCALE * g.log_pdf(x as f64);
            // NaN 视为最不可能.
            if e.is_nan() {
                w.max_window
            } else {
                w.clamp(e)
            }
        }))
    }

    /// 融合先验概率图: `(1 - γ) * likelihood + γ * prior_energy`.
    ///
    /// 前景先验能量为 `-10 * ln(0.998 * p + 0.001)`,
    /// 背景为 `-10 * ln(0.999 - 0.998 * p)`. 结果仍截断到能量窗口内.
    pub fn fuse_prior(
        &self,
        likelihood: &Array3<f64>,
        prior: ArrayView3<f32>,
        class: ElemType,
    ) -> Array3<f64> {
        let gamma = self.cfg.apriori_gamma;
        let w = self.cfg.energy;
        let mut out = likelihood.clone();
        Zip::from(&mut out).and(&prior).for_each(|t, &p| {
            let p = (p as f64).clamp(0.0, 1.0);
            let a = match class {
                ElemType::Foreground => -(p * 0.998 + 0.001).ln() * LIKELIHOOD_SCALE,
                ElemType::Background => -(0.999 - p * 0.998).ln() * LIKELIHOOD_SCALE,
            };
            *t = w.clamp((1.0 - gamma) * *t + gamma * a);
        });
        out
    }

    /// 计算两类一元能量. 配置启用先验且给出先验图时进行融合.
    ///
    /// 任一类尚未拟合时返回 `None`.
    pub fn energies(&self, patch: ArrayView3<f32>, prior: Option<ArrayView3<f32>>) -> Option<EnergyPair> {
        let mut bg = self.likelihood(patch, ElemType::Background)?;
        let mut fg = self.likelihood(patch, ElemType::Foreground)?;
        if let Some(prior) = prior.filter(|p| self.cfg.use_apriori && p.dim() == patch.dim()) {
            bg = self.fuse_prior(&bg, prior, ElemType::Background);
            fg = self.fuse_prior(&fg, prior, ElemType::Foreground);
        }
        Some((bg, fg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch() -> Array3<f32> {
        Array3::from_shape_fn((4, 6, 6), |(_, y, x)| {
            if (2..4).contains(&y) && (2..4).contains(&x) {
                200.0 + (x + y) as f32
            } else {
                20.0 + ((x * y) % 3) as f32
            }
        })
    }

    fn fitted() -> SeedModel {
        let p = patch();
        let seeds = SeedSet::from_points(
            &[(1, 2, 2), (2, 3, 3), (0, 2, 3)],
            &[(0, 0, 0), (1, 5, 5), (3, 0, 4), (2, 1, 2)],
            7.0,
        );
        let mut m = SeedModel::new(ModelConfig::default());
        assert_eq!(m.fit_seeds(p.view(), &seeds), 2);
        m
    }

    #[test]
    fn test_likelihood_within_window() {
        let m = fitted();
        let p = patch();
        for class in [ElemType::Foreground, ElemType::Background] {
            let l = m.likelihood(p.view(), class).unwrap();
            assert!(l.iter().all(|v| (0.0..=1000.0).contains(v)));
        }
        let (bg, fg) = m.energies(p.view(), None).unwrap();
        // 目标区域前景能量更低.
        assert!(fg[(1, 2, 2)] < bg[(1, 2, 2)]);
        assert!(bg[(1, 0, 0)] < fg[(1, 0, 0)]);
    }

    #[test]
    fn test_unfitted_class() {
        let mut m = SeedModel::new(ModelConfig::default());
        assert!(!m.fit(ElemType::Background, &[]));
        assert!(m.likelihood(patch().view(), ElemType::Background).is_none());
        assert!(m.energies(patch().view(), None).is_none());
    }

    #[test]
    fn test_prior_fusion() {
        let cfg = ModelConfig {
            use_apriori: true,
            apriori_gamma: 1.0,
            ..Default::default()
        };
        let mut m = SeedModel::new(cfg);
        m.fit(ElemType::Foreground, &[1.0, 2.0]);
        m.fit(ElemType::Background, &[9.0, 10.0]);
        let p = Array3::<f32>::from_elem((1, 1, 2), 5.0);
        let mut prior = Array3::<f32>::zeros((1, 1, 2));
        prior[(0, 0, 1)] = 1.0;
        let (bg, fg) = m.energies(p.view(), Some(prior.view())).unwrap();
        // γ = 1 时只剩先验能量.
        assert!((fg[(0, 0, 1)] - (-(0.999f64).ln() * 10.0)).abs() < 1e-9);
        assert!((fg[(0, 0, 0)] - (-(0.001f64).ln() * 10.0)).abs() < 1e-9);
        assert!((bg[(0, 0, 0)] - (-(0.999f64).ln() * 10.0)).abs() < 1e-9);
        assert!(fg[(0, 0, 1)] < bg[(0, 0, 1)]);
    }
}
