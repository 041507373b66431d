//! 分割请求的错误类型.
//!
//! 所有错误都局限于单次分割/评估请求, 不会终止宿主会话.

use std::path::PathBuf;

use crate::Idx3d;

/// 分割引擎错误.
#[derive(Debug, thiserror::Error)]
pub enum SegError {
    /// 某类种子点数量不足.
    #[error("insufficient seeds: {foreground} foreground, {background} background")]
    InsufficientSeeds {
        /// 前景种子个数.
        foreground: usize,
        /// 背景种子个数.
        background: usize,
    },

    /// 远程推理服务不可达, 超时, 或响应格式错误.
    #[error("remote inference failed: {0}")]
    Transport(String),

    /// 外部可执行程序不存在.
    #[error("external tool not found: {}", .0.display())]
    MissingExternalTool(PathBuf),

    /// 外部程序运行了, 但结果不可用.
    #[error("external tool failed: {0}")]
    ExternalTool(String),

    /// 参考掩码与预测形状不一致.
    #[error("shape mismatch: reference {reference:?}, prediction {prediction:?}")]
    ShapeMismatch {
        /// 参考掩码形状.
        reference: Idx3d,
        /// 预测形状.
        prediction: Idx3d,
    },

    /// 没有可用的参考掩码或预测.
    #[error("reference or prediction mask is missing")]
    MissingReference,

    /// 包围盒非法或越界.
    #[error("invalid bounding box {0:?}")]
    InvalidBox([usize; 6]),

    /// 种子点不在包围盒内.
    #[error("seed {0:?} lies outside the bounding box")]
    SeedOutsideBox(Idx3d),

    /// 配置错误.
    #[error("configuration error: {0}")]
    Config(String),

    /// 文件读写错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// nifti 文件解析错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 数组形状无法转换.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl SegError {
    /// 交互端显示的状态码. `0` 保留给成功.
    ///
    /// 种子不足, 算法不可用, 推理无结果统一报告为 `1`.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InsufficientSeeds { .. }
            | Self::Transport(_)
            | Self::MissingExternalTool(_)
            | Self::ExternalTool(_) => 1,
            Self::ShapeMismatch { .. }
            | Self::MissingReference
            | Self::InvalidBox(_)
            | Self::SeedOutsideBox(_) => 2,
            Self::Config(_) | Self::Io(_) | Self::Nifti(_) | Self::Shape(_) => 3,
        }
    }

    /// 调用方能否重试或换一个算法继续.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Config(_) | Self::Io(_) | Self::Nifti(_) | Self::Shape(_)
        )
    }
}

impl From<reqwest::Error> for SegError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else if e.is_connect() {
            Self::Transport(format!("connection failed: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// 分割结果类型.
pub type SegResult<T> = Result<T, SegError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// 种子不足是交互中的正常情况, 以状态码 1 报告.
    #[test]
    fn test_status_code() {
        let e = SegError::InsufficientSeeds {
            foreground: 1,
            background: 0,
        };
        assert_eq!(e.status_code(), 1);
        assert!(e.is_recoverable());
        assert_eq!(SegError::MissingExternalTool("rw".into()).status_code(), 1);
        assert_eq!(SegError::MissingReference.status_code(), 2);
        assert!(!SegError::Config("bad".into()).is_recoverable());
    }
}
