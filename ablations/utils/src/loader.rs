//! 对 `seg-berry::dataset` 的更一层封装. 提供更直接的数据集加载器.

use seg_berry::dataset::{self, CaseLoader};
use std::env;
use std::path::{Path, PathBuf};

/// 体数据文件名.
fn volume_name(i: u32) -> String {
    format!("volume-{i}.nii")
}

/// 参考掩码文件名.
fn mask_name(i: u32) -> String {
    format!("segmentation-{i}.nii")
}

/// 获取数据集基本路径.
///
/// 1. 若环境变量 `$SEG_DATASET_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/train`.
pub fn dataset_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("SEG_DATASET_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => dataset::home_dataset_dir_with(["train"]),
    }
}

/// 获取 `path` 下前 `n` 个病例的加载器.
pub fn case_loader<P: AsRef<Path>>(path: P, n: u32) -> CaseLoader {
    dataset::case_loader(0..n, &path, volume_name, &path, mask_name)
}
