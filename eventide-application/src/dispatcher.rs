//! 事件分发器（EventDispatcher）
//!
//! 一次分发：信封 → `EventConsumer` 解析 → 按类型匹配处理器 →
//! `RetryPolicy::execute_async` 包裹 `HandlerRunner::process` → 最终失败交给 `DeadLetterHandler`。
//!
//! 同一事件的多个处理器按注册顺序依次执行（先精确类型，后 `All`），互不影响。
//!
use crate::error::AppError;
use bon::bon;
use eventide_domain::consumer::EventConsumer;
use eventide_domain::dead_letter::{DeadLetterHandler, FailedEvent};
use eventide_domain::event::Event;
use eventide_domain::handler::{
    EventHandler, HandledEventType, HandlerObserver, HandlerOutcome, HandlerResult, HandlerRunner,
};
use eventide_domain::retry::{RetryOutcome, RetryPolicy};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// 单个（事件, 处理器）组合的执行记录
#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub handler_name: String,
    /// 实际执行次数（含首次）
    pub attempts: u32,
    pub total_delay: Duration,
    pub result: HandlerResult,
}

impl DispatchEntry {
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// 解析出的事件数
    pub event_count: usize,
    /// 没有任何处理器匹配的事件数
    pub unhandled: usize,
    pub entries: Vec<DispatchEntry>,
    /// 写入死信的失败记录
    pub failed: Vec<FailedEvent>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    fn merge(&mut self, other: DispatchReport) {
        self.event_count += other.event_count;
        self.unhandled += other.unhandled;
        self.entries.extend(other.entries);
        self.failed.extend(other.failed);
    }
}

pub struct EventDispatcher {
    consumer: EventConsumer,
    registry: HandlerRegistry,
    retry: RetryPolicy,
    dead_letter: DeadLetterHandler,
}

#[bon]
impl EventDispatcher {
    /// 构建分发器；处理器名称重复时返回 `AlreadyRegisteredHandler`
    #[builder]
    pub fn new(
        consumer: EventConsumer,
        #[builder(default)] handlers: Vec<Arc<dyn EventHandler>>,
        #[builder(default)] observers: Vec<Arc<dyn HandlerObserver>>,
        #[builder(default)] retry: RetryPolicy,
        dead_letter: Option<DeadLetterHandler>,
    ) -> Result<Self, AppError> {
        let registry = HandlerRegistry::new(handlers, &observers)?;
        let dead_letter = match dead_letter {
            Some(dead_letter) => dead_letter,
            None => DeadLetterHandler::builder().build()?,
        };

        tracing::info!(
            handler_count = registry.len(),
            observer_count = observers.len(),
            max_retries = retry.config().max_retries,
            strict_mode = consumer.config().strict_mode,
            "event dispatcher initialized"
        );

        Ok(Self {
            consumer,
            registry,
            retry,
            dead_letter,
        })
    }
}

impl EventDispatcher {
    pub fn consumer(&self) -> &EventConsumer {
        &self.consumer
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn dead_letter(&self) -> &DeadLetterHandler {
        &self.dead_letter
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.registry.names.clone()
    }

    /// 解析信封并分发其中全部事件；解析失败直接返回，不做重试
    pub async fn dispatch(&self, envelope: &Value) -> Result<DispatchReport, AppError> {
        let events = self.consumer.from_envelope(envelope)?;

        let mut report = DispatchReport::default();
        for event in &events {
            report.merge(self.dispatch_event(event).await);
        }

        tracing::info!(
            event_count = report.event_count,
            succeeded = report.succeeded(),
            failed = report.failed.len(),
            unhandled = report.unhandled,
            "dispatch complete"
        );
        Ok(report)
    }

    /// 分发一个已解析的事件到所有匹配的处理器
    pub async fn dispatch_event(&self, event: &Event) -> DispatchReport {
        let mut report = DispatchReport {
            event_count: 1,
            ..DispatchReport::default()
        };

        let runners = self.registry.matching(event.event_type());
        if runners.is_empty() {
            tracing::debug!(
                event_id = %event.event_id(),
                event_type = event.event_type(),
                "no handler registered for event type"
            );
            report.unhandled = 1;
            return report;
        }

        for runner in runners {
            let outcome = self
                .retry
                .execute_async(|| async { runner.process(event).await.into_result() })
                .await;
            let (entry, failed) = self.settle(&runner, event, outcome);
            report.entries.push(entry);
            report.failed.extend(failed);
        }
        report
    }

    fn settle(
        &self,
        runner: &HandlerRunner,
        event: &Event,
        outcome: RetryOutcome<HandlerResult, HandlerResult>,
    ) -> (DispatchEntry, Option<FailedEvent>) {
        let RetryOutcome {
            value,
            attempts,
            total_delay,
            last_error,
        } = outcome;

        let (result, failed) = match (value, last_error) {
            (Some(result), _) => (result, None),
            (None, Some(result)) => {
                let mut metadata = Map::new();
                metadata.insert(
                    "total_delay_ms".to_string(),
                    json!(u64::try_from(total_delay.as_millis()).unwrap_or(u64::MAX)),
                );
                let failed = self.dead_letter.record_failure(
                    event,
                    &result,
                    runner.handler_name(),
                    attempts,
                    metadata,
                );
                (result, Some(failed))
            }
            // 重试执行器至少执行一次，两者不会同时为空
            (None, None) => (
                HandlerResult {
                    event_id: event.event_id(),
                    tenant_id: event.tenant_id().to_string(),
                    outcome: HandlerOutcome::failure("retry produced no outcome", false),
                },
                None,
            ),
        };

        let entry = DispatchEntry {
            handler_name: runner.handler_name().to_string(),
            attempts,
            total_delay,
            result,
        };
        (entry, failed)
    }
}

/// 处理器索引：按事件类型 + 全量订阅
#[derive(Default)]
struct HandlerRegistry {
    by_type: HashMap<String, Vec<Arc<HandlerRunner>>>,
    all: Vec<Arc<HandlerRunner>>,
    names: Vec<String>,
}

impl HandlerRegistry {
    fn new(
        handlers: Vec<Arc<dyn EventHandler>>,
        observers: &[Arc<dyn HandlerObserver>],
    ) -> Result<Self, AppError> {
        let mut registry = Self::default();
        let mut seen = HashSet::new();

        for handler in handlers {
            let name = handler.handler_name().to_string();
            if !seen.insert(name.clone()) {
                return Err(AppError::AlreadyRegisteredHandler { name });
            }

            let handled = handler.handled_event_type();
            let runner = Arc::new(
                HandlerRunner::builder()
                    .handler(handler)
                    .observers(observers.to_vec())
                    .build(),
            );

            match handled {
                HandledEventType::All => registry.all.push(runner),
                HandledEventType::Many(ts) if ts.is_empty() => registry.all.push(runner),
                HandledEventType::One(t) => {
                    registry.by_type.entry(t).or_default().push(runner);
                }
                HandledEventType::Many(ts) => {
                    for t in ts {
                        let list = registry.by_type.entry(t).or_default();
                        if !list.iter().any(|r| Arc::ptr_eq(r, &runner)) {
                            list.push(runner.clone());
                        }
                    }
                }
            }
            registry.names.push(name);
        }

        Ok(registry)
    }

    fn len(&self) -> usize {
        self.names.len()
    }

    fn matching(&self, event_type: &str) -> Vec<Arc<HandlerRunner>> {
        let mut merged: Vec<Arc<HandlerRunner>> = Vec::new();
        if let Some(list) = self.by_type.get(event_type) {
            merged.extend(list.iter().cloned());
        }
        merged.extend(self.all.iter().cloned());
        merged
    }
}
