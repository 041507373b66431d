//! 算法运行统计.

use std::time::{Duration, Instant};

/// ablation/benchmark 计时器.
///
/// 该计时器支持 "中途中断" 与 "结束中断, 继续开始计时".
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器. 初始化时会视为已经开始计时.
    #[inline]
    fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
        }
    }

    /// 开始计时.
    #[inline]
    fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    #[inline]
    fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    /// 获得总共累计下来的时间 (以微秒为单位).
    #[inline]
    fn total_us(&self) -> u64 {
        self.consumed.as_micros() as u64
    }
}

/// ablation/benchmark 数据统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 分割失败的病例数.
    failed: u64,

    /// 成功分割的病例数.
    target: u64,

    /// 分割花费的总时间.
    target_time: AccTimer,

    /// 整个任务花费的总时间.
    real_time: AccTimer,

    /// 最耗时的一次分割.
    most: Option<Duration>,

    /// Dice 之和.
    dice: f64,

    /// 分割得到的前景体素总数.
    foreground: u64,
}

impl Profile {
    /// 初始化.
    #[inline]
    pub fn new() -> Self {
        Self {
            failed: 0,
            target: 0,
            target_time: AccTimer::new(),
            real_time: AccTimer::new(),
            most: None,
            dice: 0.0,
            foreground: 0,
        }
    }

    /// 记录一次失败.
    #[inline]
    pub fn count_failed(&mut self) {
        self.failed += 1;
    }

    /// 开始一次分割计时.
    #[inline]
    pub fn target_start(&mut self) {
        self.target_time.start();
    }

    /// 结束一次分割计时, 并记录其结果.
    pub fn target_elapsed(&mut self, dice: f64, foreground: usize) {
        let d = self.target_time.elapsed();
        self.most = Some(self.most.map_or(d, |m| m.max(d)));
        self.target += 1;
        self.dice += dice;
        self.foreground += foreground as u64;
    }

    /// 结束全部计时.
    #[inline]
    pub fn finish(mut self) -> Self {
        self.real_time.elapsed();
        self
    }

    /// 失败病例数.
    #[inline]
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// 成功病例数.
    #[inline]
    pub fn target(&self) -> u64 {
        self.target
    }

    /// 分割总时间 (微秒).
    #[inline]
    pub fn target_time_us(&self) -> u64 {
        self.target_time.total_us()
    }

    /// 全部任务总时间 (微秒).
    #[inline]
    pub fn real_time_us(&self) -> u64 {
        self.real_time.total_us()
    }

    /// 平均分割时间 (微秒).
    pub fn avg_target_time_us(&self) -> Option<f64> {
        match self.target {
            0 => None,
            n => Some(self.target_time_us() as f64 / n as f64),
        }
    }

    /// 平均 Dice.
    pub fn avg_dice(&self) -> Option<f64> {
        match self.target {
            0 => None,
            n => Some(self.dice / n as f64),
        }
    }

    /// 前景体素总数.
    #[inline]
    pub fn foreground(&self) -> u64 {
        self.foreground
    }

    /// 最耗时的一次分割.
    #[inline]
    pub fn most_time_consuming(&self) -> Option<Duration> {
        self.most
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile() {
        let mut p = Profile::new();
        assert_eq!(p.avg_dice(), None);
        p.target_start();
        p.target_elapsed(0.5, 3);
        p.target_start();
        p.target_elapsed(1.0, 0);
        p.count_failed();
        let p = p.finish();
        assert_eq!(p.target(), 2);
        assert_eq!(p.failed(), 1);
        assert_eq!(p.avg_dice(), Some(0.75));
        assert_eq!(p.foreground(), 3);
        assert!(p.most_time_consuming().is_some());
    }
}
