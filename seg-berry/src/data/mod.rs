use std::ops::Index;
use std::path::Path;

use ndarray::{s, Array3, ArrayView3, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::consts::gray::{SEED_BACKGROUND, SEED_FOREGROUND};
use crate::consts::ElemType;
use crate::error::{SegError, SegResult};
use crate::{Idx2d, Idx3d};

pub mod cache;
pub mod render;
pub mod state;
pub mod window;

pub use cache::{CompactCache, SegCache};
pub use render::OverlayStyle;
pub use state::SegState;
pub use window::IntensityWindow;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 读取 nii 文件, 返回 `(z, H, W)` 排布的数据与体素分辨率.
fn read_nifti(path: &Path) -> SegResult<(Array3<f32>, [f64; 3])> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = obj.header();
    let shape = get_shape_from_header(header);
    let [_, w, h, z, ..] = header.pixdim;
    let spacing = [z as f64, h as f64, w as f64];

    // [W, H, z] -> [z, H, W].
    let data = obj
        .into_volume()
        .into_ndarray::<f32>()?
        .permuted_axes([2, 1, 0].as_slice())
        .into_dimensionality::<Ix3>()?;
    debug_assert_eq!(data.dim(), shape);
    Ok((data.as_standard_layout().into_owned(), spacing))
}

/// 体素几何属性和部分通用操作.
pub trait VoxelGeometry {
    /// 数据形状 `(z, H, W)`.
    fn shape(&self) -> Idx3d;

    /// 体素分辨率, 以毫米为单位, 依次是 z, 高, 宽方向.
    fn spacing(&self) -> [f64; 3];

    /// 获取沿 `axis` 切片得到的二维形状.
    ///
    /// `axis` 不在 `0..3` 时 panic.
    #[inline]
    fn slice_shape(&self, axis: usize) -> Idx2d {
        let (z, h, w) = self.shape();
        match axis {
            0 => (h, w),
            1 => (z, w),
            2 => (z, h),
            _ => panic!("axis must be 0, 1 or 2, got {axis}"),
        }
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.spacing().iter().product()
    }

    /// 获取体素的实际体积值, 以毫升为单位. 体积差指标使用该单位.
    #[inline]
    fn voxel_unit(&self) -> f64 {
        self.voxel() / 1000.0
    }
}

/// 3D 扫描体数据. 载入后只读.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<f32>,
    spacing: [f64; 3],
    source: String,
}

impl VoxelGeometry for Volume {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    #[inline]
    fn spacing(&self) -> [f64; 3] {
        self.spacing
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 从内存数据构建. `source` 用于区分不同来源的扫描 (例如文件路径).
    pub fn new(data: Array3<f32>, spacing: [f64; 3], source: impl Into<String>) -> Self {
        Self {
            data,
            spacing,
            source: source.into(),
        }
    }

    /// 打开 nii 文件格式的 3D 扫描.
    pub fn open<P: AsRef<Path>>(path: P) -> SegResult<Self> {
        let path = path.as_ref();
        let (data, spacing) = read_nifti(path)?;
        log::debug!("opened volume {} with shape {:?}", path.display(), data.dim());
        Ok(Self::new(data, spacing, path.display().to_string()))
    }

    /// 打开 nii 文件格式的参考掩码. 体素值四舍五入后截断到 `u8`.
    pub fn open_mask<P: AsRef<Path>>(path: P) -> SegResult<Array3<u8>> {
        let (data, _) = read_nifti(path.as_ref())?;
        Ok(data.mapv(|v| v.round().clamp(0.0, u8::MAX as f32) as u8))
    }

    /// 来源标识.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 获得数据的不可变视图.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 获得包围盒内子体的不可变视图.
    #[inline]
    pub fn patch(&self, bbox: &BBox) -> ArrayView3<'_, f32> {
        let [z1, y1, x1, z2, y2, x2] = bbox.coords();
        self.data.slice(s![z1..z2, y1..y2, x1..x2])
    }

    /// 有限值中的最小值和最大值. 没有有限值时返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let finite = || self.data.iter().copied().filter(|v| v.is_finite());
        let min = finite().min_by_key(|v| OrderedFloat(*v))?;
        let max = finite().max_by_key(|v| OrderedFloat(*v))?;
        Some((min, max))
    }
}

/// 包围盒 `[z1, z2) × [y1, y2) × [x1, x2)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BBox {
    lo: Idx3d,
    hi: Idx3d,
}

impl BBox {
    /// 由 `(z1, y1, x1, z2, y2, x2)` 构建, 远端不包含.
    ///
    /// 包围盒必须非空且完全落在 `shape` 之内, 否则返回 `Err`.
    pub fn new(coords: [usize; 6], shape: Idx3d) -> SegResult<Self> {
        let [z1, y1, x1, z2, y2, x2] = coords;
        let (d, h, w) = shape;
        if z1 < z2 && y1 < y2 && x1 < x2 && z2 <= d && y2 <= h && x2 <= w {
            Ok(Self {
                lo: (z1, y1, x1),
                hi: (z2, y2, x2),
            })
        } else {
            Err(SegError::InvalidBox(coords))
        }
    }

    /// 由远端包含的坐标构建.
    pub fn inclusive(coords: [usize; 6], shape: Idx3d) -> SegResult<Self> {
        let [z1, y1, x1, z2, y2, x2] = coords;
        Self::new([z1, y1, x1, z2 + 1, y2 + 1, x2 + 1], shape)
    }

    /// 覆盖整个体数据的包围盒. `shape` 的任一维为 0 时返回 `Err`.
    pub fn whole(shape: Idx3d) -> SegResult<Self> {
        Self::new([0, 0, 0, shape.0, shape.1, shape.2], shape)
    }

    /// 六个坐标 `(z1, y1, x1, z2, y2, x2)`.
    #[inline]
    pub fn coords(&self) -> [usize; 6] {
        [self.lo.0, self.lo.1, self.lo.2, self.hi.0, self.hi.1, self.hi.2]
    }

    /// 近端角点.
    #[inline]
    pub fn origin(&self) -> Idx3d {
        self.lo
    }

    /// 子体形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (
            self.hi.0 - self.lo.0,
            self.hi.1 - self.lo.1,
            self.hi.2 - self.lo.2,
        )
    }

    /// 判断是否完全落在 `shape` 之内.
    #[inline]
    pub fn fits(&self, shape: Idx3d) -> bool {
        self.hi.0 <= shape.0 && self.hi.1 <= shape.1 && self.hi.2 <= shape.2
    }

    /// 绝对坐标是否在包围盒内.
    #[inline]
    pub fn contains(&self, (z, y, x): Idx3d) -> bool {
        (self.lo.0..self.hi.0).contains(&z)
            && (self.lo.1..self.hi.1).contains(&y)
            && (self.lo.2..self.hi.2).contains(&x)
    }

    /// 绝对坐标转为子体局部坐标. 调用方保证 `self.contains(pos)`.
    #[inline]
    pub fn to_local(&self, (z, y, x): Idx3d) -> Idx3d {
        (z - self.lo.0, y - self.lo.1, x - self.lo.2)
    }
}

/// 单个种子点. 标准差用于指数引导图.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// 坐标 `(z, y, x)`.
    pub pos: Idx3d,

    /// 三个轴向的标准差.
    pub stddev: [f32; 3],
}

impl Seed {
    /// 前景种子, 标准差为 `[2, s, s]`.
    #[inline]
    pub fn foreground(pos: Idx3d, s: f32) -> Self {
        Self {
            pos,
            stddev: [2.0, s, s],
        }
    }

    /// 背景种子, 标准差为 `[1, s, s]`.
    #[inline]
    pub fn background(pos: Idx3d, s: f32) -> Self {
        Self {
            pos,
            stddev: [1.0, s, s],
        }
    }
}

/// 前景/背景种子点集合.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedSet {
    /// 前景种子.
    pub foreground: Vec<Seed>,

    /// 背景种子.
    pub background: Vec<Seed>,
}

impl SeedSet {
    /// 由坐标列表构建, 按类别使用默认标准差.
    pub fn from_points(fg: &[Idx3d], bg: &[Idx3d], s: f32) -> Self {
        Self {
            foreground: fg.iter().map(|&p| Seed::foreground(p, s)).collect(),
            background: bg.iter().map(|&p| Seed::background(p, s)).collect(),
        }
    }

    /// 添加一个种子点.
    pub fn push(&mut self, pos: Idx3d, kind: ElemType, s: f32) {
        match kind {
            ElemType::Foreground => self.foreground.push(Seed::foreground(pos, s)),
            ElemType::Background => self.background.push(Seed::background(pos, s)),
        }
    }

    /// 获得某类别的种子.
    #[inline]
    pub fn of(&self, kind: ElemType) -> &[Seed] {
        match kind {
            ElemType::Foreground => &self.foreground,
            ElemType::Background => &self.background,
        }
    }

    /// 第一个前景种子.
    #[inline]
    pub fn first_foreground(&self) -> Option<&Seed> {
        self.foreground.first()
    }

    /// 检查种子数量是否满足算法要求.
    pub fn require(&self, min_fg: usize, min_bg: usize) -> SegResult<()> {
        let (foreground, background) = (self.foreground.len(), self.background.len());
        if foreground < min_fg || background < min_bg {
            Err(SegError::InsufficientSeeds {
                foreground,
                background,
            })
        } else {
            Ok(())
        }
    }

    /// 检查所有种子点是否都在包围盒内.
    pub fn check_within(&self, bbox: &BBox) -> SegResult<()> {
        self.foreground
            .iter()
            .chain(self.background.iter())
            .find(|s| !bbox.contains(s.pos))
            .map_or(Ok(()), |s| Err(SegError::SeedOutsideBox(s.pos)))
    }

    /// 将所有坐标转为包围盒局部坐标. 调用方保证 `self.check_within(bbox)` 成功.
    pub fn to_local(&self, bbox: &BBox) -> Self {
        let local = |v: &[Seed]| {
            v.iter()
                .map(|s| Seed {
                    pos: bbox.to_local(s.pos),
                    stddev: s.stddev,
                })
                .collect()
        };
        Self {
            foreground: local(&self.foreground),
            background: local(&self.background),
        }
    }

    /// 生成局部种子标记图. 前景为 `SEED_FOREGROUND`, 背景为 `SEED_BACKGROUND`,
    /// 同一体素同时出现时以背景为准. 越界的种子被忽略.
    pub fn label_map(&self, shape: Idx3d) -> Array3<u8> {
        let mut map = Array3::<u8>::zeros(shape);
        for s in self.foreground.iter() {
            if let Some(p) = map.get_mut(s.pos) {
                *p = SEED_FOREGROUND;
            }
        }
        for s in self.background.iter() {
            if let Some(p) = map.get_mut(s.pos) {
                *p = SEED_BACKGROUND;
            }
        }
        map
    }
}

/// 获得 `(z, h, w)` 的 6-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour6((z, h, w): Idx3d) -> [Idx3d; 6] {
    [
        (z.wrapping_sub(1), h, w),
        (z.saturating_add(1), h, w),
        (z, h.wrapping_sub(1), w),
        (z, h.saturating_add(1), w),
        (z, h, w.wrapping_sub(1)),
        (z, h, w.saturating_add(1)),
    ]
}

/// 获得 `(h, w)` 的 4-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour4((h, w): Idx2d) -> [Idx2d; 4] {
    [
        (h.wrapping_sub(1), w),
        (h.saturating_add(1), w),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
    ]
}
