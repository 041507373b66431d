//! 一维高斯混合模型, EM 拟合.

use std::f64::consts::PI;

use ordered_float::OrderedFloat;

/// 方差正则项, 防止退化为零方差.
const REG_COVAR: f64 = 1e-6;

/// 一维高斯混合模型.
#[derive(Clone, Debug, PartialEq)]
pub struct Gmm1d {
    weights: Vec<f64>,
    means: Vec<f64>,
    vars: Vec<f64>,
}

/// `log(sum(exp(v)))`, 数值稳定.
#[inline]
fn log_sum_exp(v: &[f64]) -> f64 {
    let m = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if m == f64::NEG_INFINITY {
        return m;
    }
    m + v.iter().map(|x| (x - m).exp()).sum::<f64>().ln()
}

impl Gmm1d {
    /// 用 EM 拟合最多 `k` 个分量. 分量数不超过样本数.
    ///
    /// 样本为空或 `k == 0` 时返回 `None`.
    pub fn fit(samples: &[f64], k: usize, max_iter: usize, tol: f64) -> Option<Self> {
        let n = samples.len();
        let k = k.min(n);
        if k == 0 {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable_by_key(|v| OrderedFloat(*v));

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64 + REG_COVAR;

        // 以分位点初始化均值.
        let mut gmm = Self {
            weights: vec![1.0 / k as f64; k],
            means: (0..k)
                .map(|j| sorted[((j as f64 + 0.5) / k as f64 * n as f64) as usize % n])
                .collect(),
            vars: vec![var; k],
        };

        let mut resp = vec![0.0; n * k];
        let mut logp = vec![0.0; k];
        let mut prev = f64::NEG_INFINITY;
        for it in 0..max_iter {
            // E 步
            let mut ll = 0.0;
            for (i, &x) in samples.iter().enumerate() {
                for (j, lp) in logp.iter_mut().enumerate() {
                    *lp = gmm.weights[j].ln() + gmm.log_component(j, x);
                }
                let norm = log_sum_exp(&logp);
                ll += norm;
                for (j, lp) in logp.iter().enumerate() {
                    resp[i * k + j] = (lp - norm).exp();
                }
            }
            ll /= n as f64;

            gmm.m_step(samples, &resp);

            if (ll - prev).abs() < tol {
                log::debug!("gmm converged after {} iterations", it + 1);
                break;
            }
            prev = ll;
        }
        Some(gmm)
    }

    /// M 步. `resp` 为 `[n, k]` 行优先的责任矩阵.
    ///
    /// 责任之和过小的分量保留原参数, 之后所有权重重新归一化.
    fn m_step(&mut self, samples: &[f64], resp: &[f64]) {
        let n = samples.len();
        let k = self.components();
        for j in 0..k {
            let nk: f64 = (0..n).map(|i| resp[i * k + j]).sum();
            if nk < 1e-10 {
                continue;
            }
            let mu = (0..n).map(|i| resp[i * k + j] * samples[i]).sum::<f64>() / nk;
            let v = (0..n)
                .map(|i| resp[i * k + j] * (samples[i] - mu).powi(2))
                .sum::<f64>()
                / nk;
            self.weights[j] = nk / n as f64;
            self.means[j] = mu;
            self.vars[j] = v + REG_COVAR;
        }
        let total: f64 = self.weights.iter().sum();
        if total > 0.0 {
            self.weights.iter_mut().for_each(|w| *w /= total);
        }
    }

    /// 分量数.
    #[inline]
    pub fn components(&self) -> usize {
        self.weights.len()
    }

    /// 分量均值.
    #[inline]
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    #[inline]
    fn log_component(&self, j: usize, x: f64) -> f64 {
        let v = self.vars[j];
        -0.5 * ((2.0 * PI * v).ln() + (x - self.means[j]).powi(2) / v)
    }

    /// 对数概率密度 `log p(x)`.
    pub fn log_pdf(&self, x: f64) -> f64 {
        let lp: Vec<f64> = (0..self.components())
            .map(|j| self.weights[j].ln() + self.log_component(j, x))
            .collect();
        log_sum_exp(&lp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(Gmm1d::fit(&[], 3, 100, 1e-3).is_none());
        assert!(Gmm1d::fit(&[1.0], 0, 100, 1e-3).is_none());
    }

    #[test]
    fn test_two_clusters() {
        let mut s: Vec<f64> = (0..50).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect();
        s.extend((0..50).map(|i| 100.0 + (i % 5) as f64 * 0.1));
        let g = Gmm1d::fit(&s, 2, 200, 1e-6).unwrap();
        let mut means = g.means().to_vec();
        means.sort_unstable_by_key(|v| OrderedFloat(*v));
        assert!((means[0] - 10.2).abs() < 1e-3);
        assert!((means[1] - 100.2).abs() < 1e-3);
        assert!(g.log_pdf(10.2) > g.log_pdf(55.0));
    }

    #[test]
    fn test_weights_stay_normalized_when_component_starves() {
        let samples = [1.0, 2.0, 3.0, 4.0];
        let mut g = Gmm1d {
            weights: vec![0.5, 0.5],
            means: vec![2.5, 100.0],
            vars: vec![1.0, 1.0],
        };
        // 第二个分量没有分到任何责任.
        let resp = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        g.m_step(&samples, &resp);
        assert!((g.weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((g.weights[0] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(g.means[1], 100.0);
        assert!((g.means[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample() {
        let g = Gmm1d::fit(&[42.0, 42.0], 3, 100, 1e-3).unwrap();
        assert_eq!(g.components(), 2);
        assert!(g.log_pdf(42.0).is_finite());
        assert!(g.log_pdf(42.0) > g.log_pdf(43.0));
    }
}
