//! 分割结果缓存及其压缩备份.

use std::collections::BTreeMap;
use std::io;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::{Array2, Array3, Axis, CowArray, Ix2};
use serde::{Deserialize, Serialize};

use crate::error::{SegError, SegResult};
use crate::Idx3d;

/// 分割结果缓存. 同一时刻只有一种表示处于激活状态.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SegCache {
    /// 水平切片索引 -> 二维掩码. 逐切片生成结果时使用.
    Sparse(BTreeMap<usize, Array2<u8>>),

    /// 与体数据同形状的三维掩码. 三维算法运行后使用.
    Dense(Array3<u8>),
}

impl Default for SegCache {
    #[inline]
    fn default() -> Self {
        Self::Sparse(BTreeMap::new())
    }
}

impl SegCache {
    /// 是否为空 (稀疏且没有任何切片).
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Sparse(m) if m.is_empty())
    }

    /// 是否为稠密表示.
    #[inline]
    pub fn is_dense(&self) -> bool {
        matches!(self, Self::Dense(_))
    }

    /// 沿 `axis` 取第 `index` 张切片的掩码.
    ///
    /// 稀疏表示下, 水平切片直接返回; 其它方向由已有的水平切片拼出,
    /// 没有任何相关切片时返回 `None`. 稠密表示下越界返回 `None`.
    pub fn slice(&self, axis: usize, index: usize, shape: Idx3d) -> Option<CowArray<'_, u8, Ix2>> {
        match self {
            Self::Dense(a) => {
                (index < a.len_of(Axis(axis))).then(|| a.index_axis(Axis(axis), index).into())
            }
            Self::Sparse(m) if axis == 0 => m.get(&index).map(|s| s.view().into()),
            Self::Sparse(m) => {
                let (_, h, w) = shape;
                let mut out = match axis {
                    1 => Array2::<u8>::zeros((shape.0, w)),
                    _ => Array2::<u8>::zeros((shape.0, h)),
                };
                let mut hit = false;
                for (&z, s) in m.iter().filter(|(z, _)| **z < shape.0) {
                    if let Some(lane) = (index < s.len_of(Axis(axis - 1)))
                        .then(|| s.index_axis(Axis(axis - 1), index))
                    {
                        out.row_mut(z).assign(&lane);
                        hit = true;
                    }
                }
                hit.then(|| out.into())
            }
        }
    }

    /// 插入一张水平切片. 稠密表示下不插入并返回 `false`.
    pub fn insert_slice(&mut self, index: usize, mask: Array2<u8>) -> bool {
        match self {
            Self::Sparse(m) => {
                m.insert(index, mask);
                true
            }
            Self::Dense(_) => false,
        }
    }

    /// 移除一张水平切片. 只对稀疏表示有效.
    pub fn remove_slice(&mut self, index: usize) -> Option<Array2<u8>> {
        match self {
            Self::Sparse(m) => m.remove(&index),
            Self::Dense(_) => None,
        }
    }

    /// 获得稠密副本. 稀疏表示中形状不符的切片被忽略.
    pub fn to_dense(&self, shape: Idx3d) -> Array3<u8> {
        match self {
            Self::Dense(a) => a.clone(),
            Self::Sparse(m) => {
                let mut a = Array3::<u8>::zeros(shape);
                for (&z, s) in m.iter() {
                    if z < shape.0 && s.dim() == (shape.1, shape.2) {
                        a.index_axis_mut(Axis(0), z).assign(s);
                    }
                }
                a
            }
        }
    }

    /// 显式地转换为稠密表示.
    pub fn densify(&mut self, shape: Idx3d) {
        if !self.is_dense() {
            *self = Self::Dense(self.to_dense(shape));
        }
    }

    /// 压缩为不透明备份.
    pub fn compress(&self) -> SegResult<CompactCache> {
        let mut e = ZlibEncoder::new(Vec::with_capacity(64), Compression::fast());
        bincode::serialize_into(&mut e, self).map_err(codec_error)?;
        Ok(CompactCache { buf: e.finish()? })
    }
}

/// 压缩存储的 `SegCache`; 不透明类型.
#[derive(Clone, Debug)]
pub struct CompactCache {
    /// 压缩的不透明字节流.
    buf: Vec<u8>,
}

impl CompactCache {
    /// 压缩后的字节数.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// 是否为空字节流.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 解压缩数据.
    pub fn decompress(&self) -> SegResult<SegCache> {
        let d = ZlibDecoder::new(self.buf.as_slice());
        bincode::deserialize_from(d).map_err(codec_error)
    }
}

fn codec_error(e: bincode::Error) -> SegError {
    SegError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_dense_transition() {
        let shape = (3, 2, 2);
        let mut c = SegCache::default();
        assert!(c.is_empty());
        assert!(c.insert_slice(1, Array2::from_elem((2, 2), 1)));
        assert!(!c.is_empty());
        assert!(c.slice(0, 0, shape).is_none());
        assert_eq!(c.slice(0, 1, shape).unwrap().sum(), 4);

        // 冠状面由水平切片拼出.
        let cor = c.slice(1, 0, shape).unwrap();
        assert_eq!(cor.dim(), (3, 2));
        assert_eq!(cor.row(1).sum(), 2);
        assert_eq!(cor.row(0).sum(), 0);

        c.densify(shape);
        assert!(c.is_dense());
        assert!(!c.insert_slice(0, Array2::zeros((2, 2))));
        assert_eq!(c.slice(2, 1, shape).unwrap().dim(), (3, 2));
        assert!(c.slice(0, 3, shape).is_none());
    }

    #[test]
    fn test_compress_round_trip() {
        let mut a = Array3::<u8>::zeros((4, 5, 6));
        a[(1, 2, 3)] = 1;
        a[(3, 4, 5)] = 1;
        let c = SegCache::Dense(a);
        let compact = c.compress().unwrap();
        assert!(!compact.is_empty());
        assert_eq!(compact.decompress().unwrap(), c);
    }
}
