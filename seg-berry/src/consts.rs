//! 通用常量.

/// 单通道标签值.
pub mod gray {
    /// 分割结果中, 背景的体素值.
    pub const SEG_BACKGROUND: u8 = 0;

    /// 分割结果中, 前景 (目标) 的体素值.
    pub const SEG_FOREGROUND: u8 = 1;

    /// 种子标记图中, 前景种子的体素值.
    pub const SEED_FOREGROUND: u8 = 1;

    /// 种子标记图中, 背景种子的体素值.
    pub const SEED_BACKGROUND: u8 = 2;
}

/// 负对数似然的放大倍数. 将似然映射到整数友好的能量区间.
pub const LIKELIHOOD_SCALE: f64 = 10.0;

/// 背景引导图相对前景引导图的放大倍数.
pub const BG_GUIDE_WEIGHT: f32 = 1.5;

/// 小于该体素数的 6-连通分量被视为噪声.
pub const MIN_COMPONENT_VOXELS: usize = 10;

/// 远程推理时, 切片高宽补零对齐的倍数.
pub const PAD_MULTIPLE: usize = 16;

/// 远程推理允许的最大切片高度, 超出则整体缩放.
pub const MAX_HEIGHT: usize = 960;

/// 远程推理允许的最大切片宽度, 超出则整体缩放.
pub const MAX_WIDTH: usize = 320;

/// 种子点默认的平面内标准差.
pub const DEFAULT_STDDEV: f32 = 7.0;

/// z-score 归一化的数值稳定项.
pub const Z_SCORE_EPS: f32 = 1e-8;

/// Dice 分母的数值稳定项.
pub const DICE_EPS: f64 = 1e-8;

/// 体素/像素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ElemType {
    /// `SEG_BACKGROUND`, 代表背景.
    Background,

    /// `SEG_FOREGROUND`, 代表前景.
    Foreground,
}
