/// 显示用的灰度截断窗口 `[low, high]`. 只影响渲染, 不参与分割计算.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    low: f32,
    high: f32,
}

impl IntensityWindow {
    /// 构建窗口.
    ///
    /// `low` 和 `high` 必须是有限值且 `low < high`, 否则返回 `None`.
    pub fn new(low: f32, high: f32) -> Option<IntensityWindow> {
        if low.is_finite() && high.is_finite() && low < high {
            Some(Self { low, high })
        } else {
            None
        }
    }

    /// 由窗位和窗宽构建.
    pub fn from_level_width(level: f32, width: f32) -> Option<IntensityWindow> {
        Self::new(level - width / 2.0, level + width / 2.0)
    }

    /// 窗下限.
    #[inline]
    pub fn low(&self) -> f32 {
        self.low
    }

    /// 窗上限.
    #[inline]
    pub fn high(&self) -> f32 {
        self.high
    }

    /// 只更新给出的边界. 非有限值被忽略.
    ///
    /// 返回窗口是否发生了变化.
    pub fn update(&mut self, low: Option<f32>, high: Option<f32>) -> bool {
        let mut changed = false;
        if let Some(v) = low.filter(|v| v.is_finite() && *v != self.low) {
            self.low = v;
            changed = true;
        }
        if let Some(v) = high.filter(|v| v.is_finite() && *v != self.high) {
            self.high = v;
            changed = true;
        }
        changed
    }

    /// 求在当前窗口设置下, `v` 对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, v: f32) -> Option<u8> {
        self.eval_f32(v).map(|g| g as u8)
    }

    /// 求在当前窗口设置下, `v` 对应的灰度分布点 (0.0 <= value <= 255.0).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_f32(&self, v: f32) -> Option<f32> {
        if !v.is_finite() {
            return None;
        }
        if v <= self.low {
            Some(0.0)
        } else if v >= self.high {
            Some(255.0)
        } else {
            // 255, not 256.
            Some((v - self.low) / (self.high - self.low) * 255.0)
        }
    }
}

impl Default for IntensityWindow {
    /// 腹部软组织窗 `[-100, 240]`.
    fn default() -> Self {
        Self {
            low: -100.0,
            high: 240.0,
        }
    }
}
