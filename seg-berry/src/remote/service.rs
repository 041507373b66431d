//! 远程预测服务.

use std::time::Duration;

use ndarray::{Array4, ArrayView3, ArrayView4};
use serde::Serialize;
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::{SegError, SegResult};

/// 远程预测原语: 输入归一化后的图像与双通道引导图, 返回 `[D, H, W, 2]` 的得分.
pub trait PredictionService {
    /// 调用名为 `model` 的模型. 传输失败或响应格式错误时返回 [`SegError::Transport`].
    fn predict(
        &self,
        model: &str,
        image: ArrayView3<f32>,
        guide: ArrayView4<f32>,
    ) -> SegResult<Array4<f32>>;
}

/// TensorFlow Serving 的 REST 接口 (`/v1/models/{name}:predict`).
#[derive(Debug)]
pub struct TfServingRest {
    client: reqwest::blocking::Client,
    url: String,
    signature: String,
}

#[derive(Serialize)]
struct Inputs {
    image: Vec<Vec<Vec<Vec<[f32; 1]>>>>,
    guide: Vec<Vec<Vec<Vec<Vec<f32>>>>>,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    signature_name: &'a str,
    inputs: Inputs,
}

impl TfServingRest {
    /// 按配置创建客户端, 所有请求都带超时.
    pub fn new(cfg: &RemoteConfig) -> SegResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: cfg.url.trim_end_matches('/').to_string(),
            signature: cfg.signature.clone(),
        })
    }

    /// 模型的预测地址.
    #[inline]
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/v1/models/{model}:predict", self.url)
    }
}

/// 组装 `[1, D, H, W, 1]` 图像与 `[1, D, H, W, 2]` 引导图的请求体.
fn request_body<'a>(
    signature: &'a str,
    image: ArrayView3<f32>,
    guide: ArrayView4<f32>,
) -> PredictRequest<'a> {
    let image = image
        .outer_iter()
        .map(|p| {
            p.outer_iter()
                .map(|r| r.iter().map(|&v| [v]).collect())
                .collect()
        })
        .collect();
    let guide = guide
        .outer_iter()
        .map(|p| {
            p.outer_iter()
                .map(|r| r.outer_iter().map(|c| c.to_vec()).collect())
                .collect()
        })
        .collect();
    PredictRequest {
        signature_name: signature,
        inputs: Inputs {
            image: vec![image],
            guide: vec![guide],
        },
    }
}

/// 将任意嵌套的数值数组展平.
fn flatten(v: &Value, out: &mut Vec<f32>) -> SegResult<()> {
    match v {
        Value::Number(n) => {
            let x = n
                .as_f64()
                .ok_or_else(|| SegError::Transport(format!("bad score {n}")))?;
            out.push(x as f32);
        }
        Value::Array(items) => {
            for item in items.iter() {
                flatten(item, out)?;
            }
        }
        other => {
            return Err(SegError::Transport(format!(
                "unexpected value in outputs: {other}"
            )))
        }
    }
    Ok(())
}

/// 解析响应中的得分, 整形为 `shape`. `outputs` 既可以直接是数组,
/// 也可以是以 `output_0` 为键的对象.
pub(crate) fn parse_scores(body: &Value, shape: (usize, usize, usize, usize)) -> SegResult<Array4<f32>> {
    let outputs = match body.get("outputs") {
        Some(Value::Object(map)) => map.get("output_0"),
        other => other,
    }
    .ok_or_else(|| SegError::Transport("response carries no outputs".into()))?;
    let mut scores = Vec::with_capacity(shape.0 * shape.1 * shape.2 * shape.3);
    flatten(outputs, &mut scores)?;
    Array4::from_shape_vec(shape, scores)
        .map_err(|e| SegError::Transport(format!("malformed outputs: {e}")))
}

impl PredictionService for TfServingRest {
    fn predict(
        &self,
        model: &str,
        image: ArrayView3<f32>,
        guide: ArrayView4<f32>,
    ) -> SegResult<Array4<f32>> {
        let url = self.endpoint(model);
        log::info!("POST {url}, image {:?}", image.dim());
        let body = request_body(&self.signature, image, guide);
        let resp: Value = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| {
                log::warn!("prediction request to {url} failed: {e}");
                SegError::from(e)
            })?;
        parse_scores(&resp, guide.dim())
    }
}
