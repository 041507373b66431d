//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::algo::{Algorithm, SegEngine, SegOutcome, Segmenter};
pub use crate::config::{HoleFilling, SegConfig};
pub use crate::data::{BBox, IntensityWindow, SegState, Seed, SeedSet, Volume, VoxelGeometry};
pub use crate::error::{SegError, SegResult};

pub use crate::consts::gray::{SEG_BACKGROUND, SEG_FOREGROUND};
pub use crate::consts::ElemType;

pub use crate::graph_cut::{Dinic, GraphCut, MinCut};
pub use crate::guide::{GeodesicDistance, GuideKind, RasterScan};
pub use crate::post_proc::Metrics;
pub use crate::remote::{DinAdapter, PredictionService, TfServingRest};
pub use crate::walker::RandomWalker;

pub use crate::dataset::{case_loader, home_dataset_dir_with};
