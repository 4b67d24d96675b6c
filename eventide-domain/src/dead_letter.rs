//! 失败事件追踪与告警（DeadLetterHandler）
//!
//! 处理器最终失败后生成失败记录，交给存储回调，按 `(处理器, 事件类型)`
//! 计数并在达到阈值时触发告警。回调的错误只记录日志，不会打断主流程。
//!
use crate::error::{EventError, EventResult};
use crate::event::Event;
use crate::fault::Classify;
use bon::bon;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// 失败事件记录
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEvent {
    pub id: Uuid,
    pub event: Event,
    /// 截断后的错误信息
    pub error_message: String,
    /// 故障类别标签
    pub error_type: String,
    pub handler_name: String,
    pub attempt_count: u32,
    pub first_failure_at: DateTime<Utc>,
    pub last_failure_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl FailedEvent {
    /// 存储用的扁平表示
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "event_id": self.event.event_id().to_string(),
            "event_type": self.event.event_type(),
            "tenant_id": self.event.tenant_id(),
            "error_message": self.error_message,
            "error_type": self.error_type,
            "handler_name": self.handler_name,
            "attempt_count": self.attempt_count,
            "first_failure_at": self.first_failure_at.to_rfc3339(),
            "last_failure_at": self.last_failure_at.to_rfc3339(),
            "metadata": self.metadata,
        })
    }
}

/// 失败记录的存储回调
pub trait FailureStore: Send + Sync {
    fn store(&self, failed: &FailedEvent) -> anyhow::Result<()>;
}

impl<F> FailureStore for F
where
    F: Fn(&FailedEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn store(&self, failed: &FailedEvent) -> anyhow::Result<()> {
        self(failed)
    }
}

/// 告警回调
pub trait FailureAlert: Send + Sync {
    fn alert(&self, failed: &FailedEvent) -> anyhow::Result<()>;
}

impl<F> FailureAlert for F
where
    F: Fn(&FailedEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn alert(&self, failed: &FailedEvent) -> anyhow::Result<()> {
        self(failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// 同一 `(处理器, 事件类型)` 每累计多少次失败告警一次
    pub alert_threshold: u64,
    /// 错误信息保留的最大字符数，超出部分以 `...` 结尾
    pub max_error_message_length: usize,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 1,
            max_error_message_length: 1000,
        }
    }
}

impl DeadLetterConfig {
    pub fn validate(&self) -> EventResult<()> {
        if self.alert_threshold == 0 {
            return Err(EventError::configuration(
                "alert_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// 重置计数的范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureScope {
    All,
    Handler(String),
    HandlerType {
        handler_name: String,
        event_type: String,
    },
}

pub struct DeadLetterHandler {
    store: Option<Arc<dyn FailureStore>>,
    alert: Option<Arc<dyn FailureAlert>>,
    config: DeadLetterConfig,
    counters: DashMap<(String, String), u64>,
}

#[bon]
impl DeadLetterHandler {
    #[builder]
    pub fn new(
        store: Option<Arc<dyn FailureStore>>,
        alert: Option<Arc<dyn FailureAlert>>,
        #[builder(default)] config: DeadLetterConfig,
    ) -> EventResult<Self> {
        config.validate()?;
        tracing::info!(
            alert_threshold = config.alert_threshold,
            has_alert_callback = alert.is_some(),
            has_store_callback = store.is_some(),
            "dead letter handler initialized"
        );

        Ok(Self {
            store,
            alert,
            config,
            counters: DashMap::new(),
        })
    }
}

impl fmt::Debug for DeadLetterHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadLetterHandler")
            .field("config", &self.config)
            .field("tracked_keys", &self.counters.len())
            .finish_non_exhaustive()
    }
}

impl DeadLetterHandler {
    pub fn config(&self) -> &DeadLetterConfig {
        &self.config
    }

    /// 记录一次最终失败
    pub fn record_failure<E>(
        &self,
        event: &Event,
        error: &E,
        handler_name: &str,
        attempt_count: u32,
        metadata: Map<String, Value>,
    ) -> FailedEvent
    where
        E: Classify + fmt::Display + ?Sized,
    {
        let now = Utc::now();
        let failed = FailedEvent {
            id: Uuid::new_v4(),
            event: event.clone(),
            error_message: truncate(&error.to_string(), self.config.max_error_message_length),
            error_type: error.fault_kind().as_str().to_string(),
            handler_name: handler_name.to_string(),
            attempt_count,
            first_failure_at: now,
            last_failure_at: now,
            metadata,
        };

        tracing::error!(
            dlq_id = %failed.id,
            event_id = %event.event_id(),
            event_type = event.event_type(),
            tenant_id = event.tenant_id(),
            handler = handler_name,
            error_type = %failed.error_type,
            error_message = %failed.error_message,
            attempt_count,
            "event failed"
        );

        if let Some(store) = &self.store {
            match store.store(&failed) {
                Ok(()) => tracing::debug!(dlq_id = %failed.id, "failed event stored"),
                Err(err) => {
                    tracing::error!(dlq_id = %failed.id, error = %err, "failed to store dead letter event")
                }
            }
        }

        // entry 持有分片写锁，读改写在锁内完成
        let count = {
            let key = (handler_name.to_string(), event.event_type().to_string());
            let mut counter = self.counters.entry(key).or_insert(0);
            *counter += 1;
            *counter
        };

        if self.should_alert(count) {
            self.trigger_alert(&failed, count);
        }

        failed
    }

    /// 整批失败：每个事件各记录一次（执行次数记为 1）
    pub fn record_batch_failure<E>(
        &self,
        events: &[Event],
        error: &E,
        handler_name: &str,
        metadata: Map<String, Value>,
    ) -> Vec<FailedEvent>
    where
        E: Classify + fmt::Display + ?Sized,
    {
        let failed: Vec<FailedEvent> = events
            .iter()
            .map(|event| self.record_failure(event, error, handler_name, 1, metadata.clone()))
            .collect();

        tracing::warn!(
            handler = handler_name,
            event_count = events.len(),
            error_type = error.fault_kind().as_str(),
            "batch failure processed"
        );
        failed
    }

    pub fn failure_count(&self, handler_name: &str, event_type: &str) -> u64 {
        self.counters
            .get(&(handler_name.to_string(), event_type.to_string()))
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn reset_failure_counts(&self, scope: FailureScope) {
        match &scope {
            FailureScope::All => self.counters.clear(),
            FailureScope::Handler(handler_name) => {
                self.counters.retain(|(handler, _), _| handler != handler_name)
            }
            FailureScope::HandlerType {
                handler_name,
                event_type,
            } => {
                self.counters
                    .remove(&(handler_name.clone(), event_type.clone()));
            }
        }
        tracing::info!(scope = ?scope, "failure counts reset");
    }

    fn should_alert(&self, count: u64) -> bool {
        if self.alert.is_none() {
            return false;
        }
        let threshold = self.config.alert_threshold;
        threshold == 1 || count % threshold == 0
    }

    fn trigger_alert(&self, failed: &FailedEvent, count: u64) {
        let Some(alert) = &self.alert else {
            return;
        };

        tracing::warn!(
            dlq_id = %failed.id,
            event_type = failed.event.event_type(),
            handler = %failed.handler_name,
            failure_count = count,
            "dead letter alert triggered"
        );
        if let Err(err) = alert.alert(failed) {
            tracing::error!(dlq_id = %failed.id, error = %err, "failed to send dead letter alert");
        }
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
