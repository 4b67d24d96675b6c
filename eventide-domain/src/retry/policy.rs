use super::backoff::{BackoffCalculator, BackoffStrategy};
use crate::error::{EventError, EventResult};
use crate::fault::{Classify, FaultKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// 重试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 首次执行之外的最大重试次数
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_strategy: BackoffStrategy,
    pub backoff_multiplier: f64,
    /// 可重试的故障类别；`None` 表示除 `non_retryable` 外全部可重试
    pub retryable: Option<HashSet<FaultKind>>,
    /// 不可重试的故障类别，优先于 `retryable`
    pub non_retryable: HashSet<FaultKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_strategy: BackoffStrategy::default(),
            backoff_multiplier: 2.0,
            retryable: Some(HashSet::from([
                FaultKind::Connection,
                FaultKind::Timeout,
                FaultKind::Io,
                FaultKind::Transient,
            ])),
            non_retryable: HashSet::from([
                FaultKind::Validation,
                FaultKind::TypeMismatch,
                FaultKind::MissingKey,
            ]),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> EventResult<()> {
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0) {
            return Err(EventError::configuration(
                "backoff_multiplier must be a positive number",
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(EventError::configuration(
                "base_delay must not exceed max_delay",
            ));
        }
        Ok(())
    }
}

/// 一次带重试执行的结果
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub value: Option<T>,
    /// 实际执行次数（含首次）
    pub attempts: u32,
    /// 累计等待时长
    pub total_delay: Duration,
    pub last_error: Option<E>,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    pub fn into_result(self) -> Result<T, Option<E>> {
        self.value.ok_or(self.last_error)
    }
}

/// 重试策略
///
/// 阻塞版 `execute` 与异步版 `execute_async` 共享同一套决策（`RetryState`），
/// 仅挂起方式不同。
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: Arc<dyn BackoffCalculator>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let config = RetryConfig::default();
        let backoff = config.backoff_strategy.calculator(config.backoff_multiplier);
        Self { config, backoff }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> EventResult<Self> {
        config.validate()?;
        let backoff = config.backoff_strategy.calculator(config.backoff_multiplier);
        Ok(Self { config, backoff })
    }

    /// 使用自定义退避计算器，忽略配置中的策略
    pub fn with_backoff(
        config: RetryConfig,
        backoff: Arc<dyn BackoffCalculator>,
    ) -> EventResult<Self> {
        config.validate()?;
        Ok(Self { config, backoff })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 已执行 `attempts` 次并以 `error` 失败后是否继续
    pub fn should_retry<E>(&self, error: &E, attempts: u32) -> bool
    where
        E: Classify + ?Sized,
    {
        if attempts > self.config.max_retries {
            return false;
        }
        if error.retry_hint() == Some(false) {
            return false;
        }

        let kind = error.fault_kind();
        if self.config.non_retryable.contains(&kind) {
            return false;
        }
        match &self.config.retryable {
            Some(kinds) => kinds.contains(&kind),
            None => true,
        }
    }

    /// 第 `attempt` 次重试前的等待时长（`attempt` 从 0 开始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.backoff.calculate(
            attempt,
            self.config.base_delay.as_secs_f64(),
            self.config.max_delay.as_secs_f64(),
        );
        Duration::try_from_secs_f64(secs).unwrap_or(self.config.max_delay)
    }

    /// 阻塞执行，重试间隔使用线程休眠
    pub fn execute<T, E, F>(&self, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        let mut state = RetryState::default();
        loop {
            match op() {
                Ok(value) => return state.succeed(value),
                Err(err) => match state.next_delay(self, &err) {
                    Some(delay) => std::thread::sleep(delay),
                    None => return state.give_up(err),
                },
            }
        }
    }

    /// 异步执行，重试间隔挂起当前任务
    pub async fn execute_async<T, E, F, Fut>(&self, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let mut state = RetryState::default();
        loop {
            match op().await {
                Ok(value) => return state.succeed(value),
                Err(err) => match state.next_delay(self, &err) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return state.give_up(err),
                },
            }
        }
    }
}

/// 日志用的毫秒数，超出 `u64` 时饱和
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// 单次重试调用的计数状态
#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    total_delay: Duration,
}

impl RetryState {
    fn succeed<T, E>(self, value: T) -> RetryOutcome<T, E> {
        let attempts = self.attempts + 1;
        if self.attempts > 0 {
            tracing::info!(
                attempts,
                total_delay_ms = millis(self.total_delay),
                "retry succeeded"
            );
        }
        RetryOutcome {
            value: Some(value),
            attempts,
            total_delay: self.total_delay,
            last_error: None,
        }
    }

    /// 记录一次失败；返回下次执行前的等待时长，`None` 表示停止
    fn next_delay<E>(&mut self, policy: &RetryPolicy, error: &E) -> Option<Duration>
    where
        E: Classify + fmt::Display,
    {
        self.attempts += 1;
        if !policy.should_retry(error, self.attempts) {
            tracing::warn!(
                attempts = self.attempts,
                kind = %error.fault_kind(),
                error = %error,
                "retry exhausted or error not retryable"
            );
            return None;
        }

        let delay = policy.delay_for(self.attempts - 1);
        self.total_delay = self.total_delay.saturating_add(delay);
        tracing::info!(
            attempt = self.attempts,
            max_retries = policy.config.max_retries,
            delay_ms = millis(delay),
            error = %error,
            "retry scheduled"
        );
        Some(delay)
    }

    fn give_up<T, E>(self, error: E) -> RetryOutcome<T, E> {
        RetryOutcome {
            value: None,
            attempts: self.attempts,
            total_delay: self.total_delay,
            last_error: Some(error),
        }
    }
}
