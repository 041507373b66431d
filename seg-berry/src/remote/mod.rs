//! 远程推理适配器 (DIN): 子体预处理, 引导图, 远程预测, 逆映射.

use std::time::Instant;

use ndarray::{Array3, ArrayView3};

use crate::algo::Segmenter;
use crate::config::{GuideConfig, RemoteConfig};
use crate::data::{BBox, Seed, SeedSet, Volume};
use crate::error::{SegError, SegResult};
use crate::guide::{self, GeodesicDistance, GuideKind, RasterScan};

pub mod patch;
pub mod service;

pub use patch::PatchGeometry;
pub use service::{PredictionService, TfServingRest};

/// 缓存键: 包围盒与数据来源.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchKey {
    /// 包围盒.
    pub bbox: BBox,
    /// 体数据来源.
    pub source: String,
}

/// 预处理后的子体.
#[derive(Clone, Debug)]
pub struct PreparedPatch {
    /// 网络输入图像.
    pub image: Array3<f32>,
    /// 对应的几何变换.
    pub geometry: PatchGeometry,
}

/// 容量为 1 的预处理缓存. 新键写入时旧项被淘汰.
#[derive(Debug, Default)]
pub struct PatchCache {
    slot: Option<(PatchKey, PreparedPatch)>,
    hits: usize,
    misses: usize,
}

impl PatchCache {
    /// 取出 `key` 对应的子体, 未命中时用 `build` 生成并替换旧项.
    pub fn get_or_insert_with<F>(&mut self, key: PatchKey, build: F) -> &PreparedPatch
    where
        F: FnOnce() -> PreparedPatch,
    {
        if self.slot.as_ref().map_or(false, |(k, _)| *k == key) {
            self.hits += 1;
            log::debug!("patch cache hit for {:?}", key.bbox);
        } else {
            self.misses += 1;
            log::debug!("patch cache miss for {:?}", key.bbox);
            self.slot = None;
        }
        &self.slot.get_or_insert_with(|| (key, build())).1
    }

    /// 当前缓存键.
    #[inline]
    pub fn key(&self) -> Option<&PatchKey> {
        self.slot.as_ref().map(|(k, _)| k)
    }

    /// `(命中, 未命中)` 次数.
    #[inline]
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    /// 清空.
    pub fn clear(&mut self) {
        self.slot = None;
    }
}

/// DIN 远程推理分割器. 每个实例独占自己的预处理缓存.
pub struct DinAdapter<S: PredictionService> {
    service: S,
    cfg: RemoteConfig,
    guide_cfg: GuideConfig,
    geodesic: Box<dyn GeodesicDistance + Send>,
    cache: PatchCache,
    kind: GuideKind,
}

impl DinAdapter<TfServingRest> {
    /// 连接 TensorFlow Serving.
    pub fn connect(cfg: RemoteConfig, guide_cfg: GuideConfig) -> SegResult<Self> {
        let service = TfServingRest::new(&cfg)?;
        Ok(Self::new(service, cfg, guide_cfg))
    }
}

impl<S: PredictionService> DinAdapter<S> {
    /// 使用任意预测服务, 默认指数引导图.
    pub fn new(service: S, cfg: RemoteConfig, guide_cfg: GuideConfig) -> Self {
        Self {
            service,
            cfg,
            guide_cfg,
            geodesic: Box::new(RasterScan),
            cache: PatchCache::default(),
            kind: GuideKind::Exponential,
        }
    }

    /// 替换测地距离实现.
    pub fn with_geodesic(mut self, g: impl GeodesicDistance + Send + 'static) -> Self {
        self.geodesic = Box::new(g);
        self
    }

    /// 选择引导图类型.
    #[inline]
    pub fn set_guide(&mut self, kind: GuideKind) {
        self.kind = kind;
    }

    /// 当前引导图类型.
    #[inline]
    pub fn guide(&self) -> GuideKind {
        self.kind
    }

    /// 当前模型名 `din-{exp, euc, geo}`.
    #[inline]
    pub fn model_name(&self) -> String {
        format!("din-{}", self.kind.short_name())
    }

    /// 预处理缓存.
    #[inline]
    pub fn cache(&self) -> &PatchCache {
        &self.cache
    }

    /// 预测服务.
    #[inline]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// 将局部种子映射到网络输入坐标, 标准差同倍率缩放.
    fn map_seeds(seeds: &SeedSet, geometry: &PatchGeometry) -> SeedSet {
        let scale = geometry.scale();
        let map = |v: &[Seed]| {
            v.iter()
                .map(|s| Seed {
                    pos: geometry.map_point(s.pos),
                    stddev: [
                        s.stddev[0] * scale[0],
                        s.stddev[1] * scale[1],
                        s.stddev[2] * scale[2],
                    ],
                })
                .collect()
        };
        SeedSet {
            foreground: map(&seeds.foreground),
            background: map(&seeds.background),
        }
    }

    /// 对子体推理. `seeds` 为局部坐标, 返回包围盒形状的二值图.
    pub fn predict_patch(
        &mut self,
        key: PatchKey,
        patch: ArrayView3<f32>,
        seeds: &SeedSet,
    ) -> SegResult<Array3<u8>> {
        let geometry = PatchGeometry::plan(patch.dim(), self.cfg.max_height, self.cfg.max_width);
        let prepared = self.cache.get_or_insert_with(key, || PreparedPatch {
            image: geometry.prepare(patch),
            geometry,
        });

        let local = Self::map_seeds(seeds, &prepared.geometry);
        let guides = guide::synthesize(
            self.kind,
            prepared.image.view(),
            &local,
            &self.guide_cfg,
            self.geodesic.as_ref(),
        );
        let name = format!("din-{}", self.kind.short_name());
        let scores = self
            .service
            .predict(&name, prepared.image.view(), guides.stacked().view())?;
        let (d, h, w, _) = scores.dim();
        if (d, h, w) != prepared.image.dim() {
            return Err(SegError::Transport(format!(
                "scores {:?} do not match input {:?}",
                scores.dim(),
                prepared.image.dim()
            )));
        }
        let labels = patch::argmax2(&scores);
        Ok(prepared.geometry.restore(labels.view()))
    }
}

impl<S: PredictionService> Segmenter for DinAdapter<S> {
    fn segment(&mut self, volume: &Volume, bbox: &BBox, seeds: &SeedSet) -> SegResult<Array3<u8>> {
        let t = Instant::now();
        let key = PatchKey {
            bbox: *bbox,
            source: volume.source().to_string(),
        };
        let out = self.predict_patch(key, volume.patch(bbox), &seeds.to_local(bbox))?;
        log::info!(
            "{} on patch {:?} finished in {} ms",
            self.model_name(),
            bbox.shape(),
            t.elapsed().as_millis()
        );
        Ok(out)
    }
}
