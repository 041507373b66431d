//! 通用的体数据 + 参考掩码加载器.
//!
//! 提供迭代器风格的数据集获取模式.

use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::data::{Volume, VoxelGeometry};
use crate::error::{SegError, SegResult};

/// 文件名构造器. 接受数据集索引数, 获得文件名.
pub type FilenameBuilder = fn(u32) -> String;

/// 从指定索引, 路径, 文件名构造器来创建病例加载器.
///
/// # 注意
///
/// `data` 的所有取值 `value` 必须在 `volume_dir` 下有形如 `volume_builder(value)`,
/// 在 `mask_dir` 下有形如 `mask_builder(value)` 的 nifti 文件,
/// 否则加载器在迭代时会返回 `Err`.
pub fn case_loader<I: IntoIterator<Item = u32>, P: AsRef<Path>>(
    data: I,
    volume_dir: P,
    volume_builder: FilenameBuilder,
    mask_dir: P,
    mask_builder: FilenameBuilder,
) -> CaseLoader {
    let mut data: Vec<u32> = data.into_iter().collect();
    data.reverse();

    CaseLoader {
        volume_dir: volume_dir.as_ref().to_owned(),
        volume_builder,
        mask_dir: mask_dir.as_ref().to_owned(),
        mask_builder,
        data_rev: data,
    }
}

/// 病例 (体数据 + 参考掩码) 加载器, 并在内部自动转换文件名.
#[derive(Debug)]
pub struct CaseLoader {
    volume_dir: PathBuf,
    volume_builder: FilenameBuilder,
    mask_dir: PathBuf,
    mask_builder: FilenameBuilder,
    data_rev: Vec<u32>,
}

impl CaseLoader {
    fn load(&self, idx: u32) -> SegResult<(Volume, Array3<u8>)> {
        let volume = Volume::open(self.volume_dir.join((self.volume_builder)(idx)))?;
        let mask = Volume::open_mask(self.mask_dir.join((self.mask_builder)(idx)))?;
        if mask.dim() != volume.shape() {
            return Err(SegError::ShapeMismatch {
                reference: mask.dim(),
                prediction: volume.shape(),
            });
        }
        Ok((volume, mask))
    }
}

impl Iterator for CaseLoader {
    type Item = (u32, SegResult<(Volume, Array3<u8>)>);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.data_rev.pop()?;
        Some((idx, self.load(idx)))
    }
}

impl ExactSizeIterator for CaseLoader {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}
