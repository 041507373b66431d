//! 会话状态: 体数据, 显示窗口, 分割缓存与撤销备份.

use std::io;
use std::path::Path;

use image::RgbImage;
use ndarray::{Array2, Array3, Axis};

use super::render::{overlay, to_rgb, OverlayStyle};
use super::{BBox, CompactCache, IntensityWindow, SegCache, Volume, VoxelGeometry};
use crate::error::{SegError, SegResult};
use crate::post_proc::metrics::{compute_metrics, Metrics};

/// 会话状态. 分割缓存只由该结构持有和修改.
#[derive(Debug)]
pub struct SegState {
    volume: Volume,
    window: IntensityWindow,
    cache: SegCache,
    backup: Option<CompactCache>,
    reference: Option<Array3<u8>>,
    style: OverlayStyle,
}

impl SegState {
    /// 以体数据初始化. 显示窗口取体数据有限值的范围, 无法构造时使用默认窗口.
    pub fn new(volume: Volume) -> Self {
        let window = volume
            .min_max()
            .and_then(|(lo, hi)| IntensityWindow::new(lo, hi))
            .unwrap_or_default();
        Self {
            volume,
            window,
            cache: SegCache::default(),
            backup: None,
            reference: None,
            style: OverlayStyle::default(),
        }
    }

    /// 替换叠加样式.
    #[inline]
    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    /// 体数据.
    #[inline]
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// 当前显示窗口.
    #[inline]
    pub fn window(&self) -> &IntensityWindow {
        &self.window
    }

    /// 当前分割缓存.
    #[inline]
    pub fn cache(&self) -> &SegCache {
        &self.cache
    }

    /// 参考掩码.
    #[inline]
    pub fn reference(&self) -> Option<&Array3<u8>> {
        self.reference.as_ref()
    }

    /// 是否存在可撤销的备份.
    #[inline]
    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// 挂载参考掩码. 形状必须与体数据一致.
    pub fn attach_reference(&mut self, reference: Array3<u8>) -> SegResult<()> {
        if reference.dim() != self.volume.shape() {
            return Err(SegError::ShapeMismatch {
                reference: reference.dim(),
                prediction: self.volume.shape(),
            });
        }
        self.reference = Some(reference);
        Ok(())
    }

    /// 更新显示窗口. 只更新给出的有限边界, 返回窗口是否变化.
    #[inline]
    pub fn set_intensity_clip(&mut self, low: Option<f32>, high: Option<f32>) -> bool {
        self.window.update(low, high)
    }

    /// 渲染沿 `axis` 的第 `index` 张切片.
    ///
    /// 先叠加参考掩码, 再叠加分割结果, 重叠处以分割结果为准.
    /// 不会修改缓存. `axis` 或 `index` 越界时 panic.
    pub fn at(&self, index: usize, axis: usize, show_seg: bool, show_ref: bool) -> RgbImage {
        let slice = self.volume.data().index_axis_move(Axis(axis), index);
        let mut img = to_rgb(slice, &self.window);
        if show_ref {
            if let Some(r) = self.reference.as_ref() {
                let mask = r.index_axis(Axis(axis), index);
                overlay(&mut img, mask, self.style.reference_color, &self.style);
            }
        }
        if show_seg {
            if let Some(mask) = self.cache.slice(axis, index, self.volume.shape()) {
                overlay(&mut img, mask.view(), self.style.segmentation_color, &self.style);
            }
        }
        img
    }

    /// 清除分割结果.
    ///
    /// 稠密表示下先备份再重置为空的稀疏表示; 稀疏表示下只移除第 `index` 张水平切片.
    pub fn clear(&mut self, index: usize) -> SegResult<()> {
        if self.cache.is_dense() {
            self.backup = Some(self.cache.compress()?);
            self.cache = SegCache::default();
            log::debug!("dense segmentation cleared, backup kept");
        } else if self.cache.remove_slice(index).is_some() {
            log::debug!("segmentation slice {index} cleared");
        }
        Ok(())
    }

    /// 撤销最近一次清除. 没有备份时返回 `Ok(false)`.
    pub fn undo(&mut self) -> SegResult<bool> {
        let Some(backup) = self.backup.as_ref() else {
            return Ok(false);
        };
        self.cache = backup.decompress()?;
        self.backup = None;
        log::debug!("segmentation restored from backup");
        Ok(true)
    }

    /// 直接读取体素值. 调用方保证索引合法, 越界时 panic.
    #[inline]
    pub fn pixel(&self, index: usize, row: usize, col: usize, axis: usize) -> f32 {
        let pos = match axis {
            0 => (index, row, col),
            1 => (row, index, col),
            2 => (row, col, index),
            _ => panic!("axis must be 0, 1 or 2, got {axis}"),
        };
        self.volume[pos]
    }

    /// 发布完整的三维结果. 旧备份随之失效.
    pub fn publish(&mut self, mask: Array3<u8>) -> SegResult<()> {
        if mask.dim() != self.volume.shape() {
            return Err(SegError::ShapeMismatch {
                reference: self.volume.shape(),
                prediction: mask.dim(),
            });
        }
        self.cache = SegCache::Dense(mask);
        self.backup = None;
        Ok(())
    }

    /// 发布一张水平切片结果. 只在稀疏表示下有效.
    pub fn publish_slice(&mut self, index: usize, mask: Array2<u8>) -> SegResult<bool> {
        let (d, h, w) = self.volume.shape();
        if index >= d || mask.dim() != (h, w) {
            return Err(SegError::ShapeMismatch {
                reference: (d, h, w),
                prediction: (index, mask.dim().0, mask.dim().1),
            });
        }
        let inserted = self.cache.insert_slice(index, mask);
        if inserted {
            self.backup = None;
        }
        Ok(inserted)
    }

    /// 在 `bbox` 内对比参考掩码与当前分割结果.
    pub fn metrics(&self, bbox: &BBox) -> SegResult<Metrics> {
        let reference = self.reference.as_ref().ok_or(SegError::MissingReference)?;
        if self.cache.is_empty() {
            return Err(SegError::MissingReference);
        }
        let prediction = self.cache.to_dense(self.volume.shape());
        compute_metrics(
            reference.view(),
            prediction.view(),
            bbox,
            self.volume.voxel_unit(),
        )
    }

    /// 将稠密分割结果保存为 npy 文件.
    pub fn save_npy<P: AsRef<Path>>(&self, path: P) -> SegResult<()> {
        let dense = self.cache.to_dense(self.volume.shape());
        ndarray_npy::write_npy(path, &dense)
            .map_err(|e| SegError::Io(io::Error::new(io::ErrorKind::Other, e)))
    }

    /// 将渲染后的切片保存为图片.
    pub fn export_png<P: AsRef<Path>>(&self, index: usize, axis: usize, path: P) -> SegResult<()> {
        self.at(index, axis, true, true)
            .save(path)
            .map_err(|e| SegError::Io(io::Error::new(io::ErrorKind::Other, e)))
    }
}
