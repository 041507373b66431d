//! 引擎配置.
//!
//! 所有小节都可以缺省, 缺省值即为交互标注时的常用取值.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::consts::{DEFAULT_STDDEV, MAX_HEIGHT, MAX_WIDTH, MIN_COMPONENT_VOXELS};
use crate::error::{SegError, SegResult};

/// 顶层配置.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SegConfig {
    /// 图割参数.
    pub graph_cut: GraphCutConfig,
    /// 统计模型参数.
    pub model: ModelConfig,
    /// 引导图参数.
    pub guide: GuideConfig,
    /// 远程推理参数.
    pub remote: RemoteConfig,
    /// 后处理参数.
    pub post: PostConfig,
    /// 随机游走外部程序参数.
    pub walker: WalkerConfig,
    /// 切片渲染参数.
    pub render: RenderConfig,
}

impl SegConfig {
    /// 从 JSON 字符串解析.
    pub fn from_json_str(s: &str) -> SegResult<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| SegError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 从 JSON 文件加载.
    pub fn load<P: AsRef<Path>>(path: P) -> SegResult<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&data)
    }

    /// 检查参数取值范围.
    pub fn validate(&self) -> SegResult<()> {
        let check_window = |w: &EnergyWindow, name: &str| {
            if !(0.0 <= w.min_window && w.min_window <= w.max_window) {
                Err(SegError::Config(format!(
                    "{name}: energy window [{}, {}] is invalid",
                    w.min_window, w.max_window
                )))
            } else {
                Ok(())
            }
        };
        check_window(&self.graph_cut.energy, "graph_cut")?;
        check_window(&self.model.energy, "model")?;
        if self.graph_cut.pairwise_alpha < 0 {
            return Err(SegError::Config("pairwise_alpha must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.model.apriori_gamma) {
            return Err(SegError::Config("apriori_gamma must lie in [0, 1]".into()));
        }
        if self.model.components == 0 {
            return Err(SegError::Config("model needs at least one component".into()));
        }
        if self.remote.max_height == 0 || self.remote.max_width == 0 {
            return Err(SegError::Config("max_height/max_width must be positive".into()));
        }
        Ok(())
    }
}

/// 能量截断窗口. 每个算法分支各持一份.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnergyWindow {
    /// 下界.
    pub min_window: f64,
    /// 上界.
    pub max_window: f64,
}

impl EnergyWindow {
    /// 宽窗口的上界.
    pub const MAX_LIMIT: f64 = 20000.0;

    /// 宽窗口 `[0, MAX_LIMIT]`, 似然差异更大时使用.
    pub fn wide() -> Self {
        Self {
            min_window: 0.0,
            max_window: Self::MAX_LIMIT,
        }
    }

    /// 将 `v` 截断到窗口内. 窗口无效 (下界大于上界或含 NaN) 时不会 panic,
    /// 上界优先.
    #[inline]
    pub fn clamp(&self, v: f64) -> f64 {
        v.max(self.min_window).min(self.max_window)
    }
}

impl Default for EnergyWindow {
    fn default() -> Self {
        Self {
            min_window: 0.0,
            max_window: 1000.0,
        }
    }
}

/// 图割参数.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GraphCutConfig {
    /// 相邻体素标签不一致时的惩罚.
    pub pairwise_alpha: i32,
    /// 一元项截断窗口.
    pub energy: EnergyWindow,
    /// 是否按图像梯度调整相邻项.
    pub use_boundary_penalties: bool,
    /// 边界惩罚的灰度尺度.
    pub boundary_sigma: f64,
}

impl Default for GraphCutConfig {
    fn default() -> Self {
        Self {
            pairwise_alpha: 20,
            energy: EnergyWindow::default(),
            use_boundary_penalties: false,
            boundary_sigma: 10.0,
        }
    }
}

/// 统计模型参数.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// 每类高斯混合分量数.
    pub components: usize,
    /// EM 最大迭代次数.
    pub max_iterations: usize,
    /// EM 收敛阈值 (平均对数似然变化量).
    pub tolerance: f64,
    /// 似然截断窗口.
    pub energy: EnergyWindow,
    /// 是否融合先验概率图.
    pub use_apriori: bool,
    /// 先验融合权重, 位于 `[0, 1]`.
    pub apriori_gamma: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            components: 3,
            max_iterations: 100,
            tolerance: 1e-3,
            energy: EnergyWindow::default(),
            use_apriori: false,
            apriori_gamma: 0.1,
        }
    }
}

/// 引导图参数.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    /// 测地距离中灰度项的权重.
    pub geodesic_lambda: f32,
    /// 测地距离的往返扫描次数.
    pub geodesic_iterations: usize,
    /// 种子平面内默认标准差.
    pub default_stddev: f32,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            geodesic_lambda: 1.0,
            geodesic_iterations: 2,
            default_stddev: DEFAULT_STDDEV,
        }
    }
}

/// 远程推理参数.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// 服务根地址.
    pub url: String,
    /// 模型签名.
    pub signature: String,
    /// 请求超时 (秒).
    pub timeout_secs: u64,
    /// 最大切片高度.
    pub max_height: usize,
    /// 最大切片宽度.
    pub max_width: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8501".to_string(),
            signature: "serving_default".to_string(),
            timeout_secs: 30,
            max_height: MAX_HEIGHT,
            max_width: MAX_WIDTH,
        }
    }
}

/// 空洞填充策略.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HoleFilling {
    /// 不填充.
    None,
    /// 只填充第一个前景种子所在的水平切片.
    #[default]
    SeedSlice,
    /// 填充所有水平切片.
    AllSlices,
}

/// 后处理参数.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    /// 保留的连通分量最小体素数.
    pub min_component: usize,
    /// 空洞填充策略.
    pub hole_filling: HoleFilling,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            min_component: MIN_COMPONENT_VOXELS,
            hole_filling: HoleFilling::default(),
        }
    }
}

/// 随机游走外部程序参数.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// 可执行文件路径.
    pub executable: PathBuf,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        let mut executable = dirs::home_dir().unwrap_or_default();
        executable.push(".seg-berry");
        executable.push(if cfg!(windows) {
            "RandomWalk-3D.exe"
        } else {
            "RandomWalk-3D"
        });
        Self { executable }
    }
}

/// 切片渲染参数.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// 叠加色混合系数.
    pub alpha: f32,
    /// 分割结果颜色.
    pub segmentation_color: [u8; 3],
    /// 参考掩码颜色.
    pub reference_color: [u8; 3],
    /// 是否只画轮廓.
    pub contour: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            segmentation_color: [255, 255, 0],
            reference_color: [255, 0, 0],
            contour: false,
        }
    }
}
