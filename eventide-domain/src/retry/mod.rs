//! 重试引擎
//!
//! 以可插拔的退避计算器决定重试间隔，按故障类别决定是否继续；
//! 不提供取消钩子，需要超时的调用方自行包裹 `tokio::time::timeout`。
//!
mod backoff;
mod policy;

pub use backoff::{
    BackoffCalculator, BackoffStrategy, ExponentialBackoff, ExponentialJitterBackoff,
    FixedBackoff, LinearBackoff,
};
pub use policy::{RetryConfig, RetryOutcome, RetryPolicy};
