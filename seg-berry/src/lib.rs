#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 为三维医学影像标注工具提供交互式分割引擎:
//! 用户给出包围盒和少量前景/背景种子点, 引擎在包围盒内给出稠密的二值分割.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 同一会话同一时刻只处理一个分割请求. 引擎内部不加锁, 由调用方保证不重入.
//! 2. 所有失败都局限于单次请求, 并以 [`SegError`] 返回, 分割缓存保持不变.
//!   只有调用方违反约定 (例如越界访问像素) 时程序才会 panic.
//!
//! # 开发计划
//!
//! ### 体数据与会话状态 ✅
//!
//! 显示窗口, 三个方向的切片渲染 (叠加分割结果和参考掩码), 清除与单步撤销.
//! 撤销备份以压缩形式保存.
//!
//! 实现位于 `seg-berry/src/data`.
//!
//! ### 引导图 ✅
//!
//! 指数衰减, 欧氏距离, 测地距离三种空间先验.
//!
//! 实现位于 `seg-berry/src/guide`.
//!
//! ### 灰度统计模型 ✅
//!
//! 一维高斯混合模型 (EM 拟合), 输出截断后的负对数似然, 可选先验融合.
//!
//! 实现位于 `seg-berry/src/model`.
//!
//! ### 三维图割 ✅
//!
//! 6-邻接图, 硬约束种子, 可选灰度边界惩罚. 默认使用 Dinic 最小割.
//!
//! 实现位于 `seg-berry/src/graph_cut`.
//!
//! ### 远程推理 (DIN) ✅
//!
//! 子体归一化, 缩放/补零, 远程预测, 逆映射. 预处理结果缓存在适配器内部.
//!
//! 实现位于 `seg-berry/src/remote`.
//!
//! ### 随机游走 ✅
//!
//! 通过临时文件调用外部程序.
//!
//! 实现位于 `seg-berry/src/walker.rs`.
//!
//! ### 后处理与指标 ✅
//!
//! 小连通域过滤, 二维空洞填充, Dice / VD / RVD.
//!
//! 实现位于 `seg-berry/src/post_proc`.
//!
//! ### 测地距离的快速行进实现 ⌛️
//!
//! 目前只有光栅扫描近似.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 体数据, 会话状态与分割缓存.
pub mod data;

pub use data::{
    BBox, CompactCache, IntensityWindow, OverlayStyle, SegCache, SegState, Seed, SeedSet, Volume,
    VoxelGeometry,
};

pub mod algo;
pub mod config;
pub mod consts;
pub mod dataset;
pub mod error;
pub mod graph_cut;
pub mod guide;
pub mod model;
pub mod post_proc;
pub mod prelude;
pub mod remote;
pub mod walker;

pub use algo::{Algorithm, SegEngine, SegOutcome, Segmenter};
pub use config::SegConfig;
pub use error::{SegError, SegResult};
