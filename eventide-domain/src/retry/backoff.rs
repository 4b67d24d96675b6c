use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 退避策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// 固定间隔
    Fixed,
    /// 线性递增
    Linear,
    /// 指数递增
    Exponential,
    /// 指数递增并叠加随机抖动
    #[default]
    ExponentialJitter,
}

impl BackoffStrategy {
    /// 按策略构造计算器；`multiplier` 对固定间隔无效
    pub fn calculator(self, multiplier: f64) -> Arc<dyn BackoffCalculator> {
        match self {
            Self::Fixed => Arc::new(FixedBackoff),
            Self::Linear => Arc::new(LinearBackoff::new(multiplier)),
            Self::Exponential => Arc::new(ExponentialBackoff::new(multiplier)),
            Self::ExponentialJitter => Arc::new(ExponentialJitterBackoff::new(multiplier)),
        }
    }
}

/// 退避时长计算（单位：秒）
///
/// `attempt` 从 0 开始，结果不超过 `max_delay`。
pub trait BackoffCalculator: Send + Sync {
    fn calculate(&self, attempt: u32, base_delay: f64, max_delay: f64) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedBackoff;

impl BackoffCalculator for FixedBackoff {
    fn calculate(&self, _attempt: u32, base_delay: f64, max_delay: f64) -> f64 {
        base_delay.min(max_delay)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    multiplier: f64,
}

impl LinearBackoff {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl BackoffCalculator for LinearBackoff {
    fn calculate(&self, attempt: u32, base_delay: f64, max_delay: f64) -> f64 {
        let delay = base_delay * (f64::from(attempt) + 1.0) * self.multiplier;
        delay.min(max_delay)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    multiplier: f64,
}

impl ExponentialBackoff {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl BackoffCalculator for ExponentialBackoff {
    fn calculate(&self, attempt: u32, base_delay: f64, max_delay: f64) -> f64 {
        exponential(base_delay, self.multiplier, attempt).min(max_delay)
    }
}

/// 指数退避叠加 `[0, 0.5 * base]` 的均匀抖动
#[derive(Debug, Clone, Copy)]
pub struct ExponentialJitterBackoff {
    multiplier: f64,
}

impl ExponentialJitterBackoff {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Default for ExponentialJitterBackoff {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl BackoffCalculator for ExponentialJitterBackoff {
    fn calculate(&self, attempt: u32, base_delay: f64, max_delay: f64) -> f64 {
        let base = exponential(base_delay, self.multiplier, attempt);
        // 已达上限（含溢出为无穷）时无需抽样
        if base.is_nan() || base >= max_delay {
            return max_delay;
        }
        if base <= 0.0 {
            return base.max(0.0);
        }

        let jitter = rand::rng().random_range(0.0..=base * 0.5);
        (base + jitter).min(max_delay)
    }
}

fn exponential(base_delay: f64, multiplier: f64, attempt: u32) -> f64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    base_delay * multiplier.powi(exponent)
}
