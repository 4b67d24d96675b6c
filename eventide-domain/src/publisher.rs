//! 事件发布（EventPublisher）
//!
//! 将类型化事件转换为总线条目，按批次交给 `BusClient` 发送。
//! 传输实现不在本 crate 内，`BusClient` 是唯一接缝。
//!
use crate::error::{EventError, EventResult};
use crate::event::Event;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 单次 `put_events` 的最大条目数
pub const MAX_BATCH_SIZE: usize = 10;

/// 总线条目（字段名与总线 API 一致）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BusEntry {
    pub event_bus_name: String,
    pub source: String,
    pub detail_type: String,
    /// 扁平信封的 JSON 文本
    pub detail: String,
}

/// 单条目的发送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Accepted { entry_id: Option<String> },
    Rejected { code: String, message: String },
}

/// 事件总线传输接缝
#[async_trait]
pub trait BusClient: Send + Sync {
    fn event_bus_name(&self) -> &str;

    /// 结果与输入条目一一对应
    async fn put_events(&self, entries: &[BusEntry]) -> anyhow::Result<Vec<PublishStatus>>;
}

impl Event {
    /// 转换为总线条目，`DetailType` 即类型标签
    pub fn to_bus_entry(&self, event_bus_name: &str) -> EventResult<BusEntry> {
        let detail = serde_json::to_string(&self.to_envelope()?)?;
        Ok(BusEntry {
            event_bus_name: event_bus_name.to_string(),
            source: self.source().to_string(),
            detail_type: self.event_type().to_string(),
            detail,
        })
    }
}

pub struct EventPublisher {
    client: Arc<dyn BusClient>,
}

impl EventPublisher {
    pub fn new(client: Arc<dyn BusClient>) -> Self {
        tracing::info!(
            event_bus_name = client.event_bus_name(),
            "event publisher initialized"
        );
        Self { client }
    }

    pub fn event_bus_name(&self) -> &str {
        self.client.event_bus_name()
    }

    /// 发布单个事件，返回事件 ID
    pub async fn publish(&self, event: &Event) -> EventResult<Uuid> {
        check_publishable(event)?;
        let entry = event.to_bus_entry(self.event_bus_name())?;

        tracing::info!(
            event_id = %event.event_id(),
            event_type = event.event_type(),
            tenant_id = event.tenant_id(),
            correlation_id = ?event.correlation_id(),
            "publishing event"
        );

        let statuses = self.send(std::slice::from_ref(&entry)).await?;
        if let Some(PublishStatus::Rejected { code, message }) = statuses.first() {
            return Err(rejected(event, code, message));
        }

        tracing::info!(event_id = %event.event_id(), "event published");
        Ok(event.event_id())
    }

    /// 分批发布；任一条目被拒绝即返回错误（此前批次已发送）
    pub async fn publish_batch(&self, events: &[Event]) -> EventResult<Vec<Uuid>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        for event in events {
            check_publishable(event)?;
        }

        let mut published = Vec::with_capacity(events.len());
        for (index, batch) in events.chunks(MAX_BATCH_SIZE).enumerate() {
            let entries = batch
                .iter()
                .map(|ev| ev.to_bus_entry(self.event_bus_name()))
                .collect::<EventResult<Vec<_>>>()?;

            tracing::info!(
                batch_number = index + 1,
                batch_size = batch.len(),
                total_events = events.len(),
                "publishing event batch"
            );

            let statuses = self.send(&entries).await?;
            for (event, status) in batch.iter().zip(&statuses) {
                if let PublishStatus::Rejected { code, message } = status {
                    return Err(rejected(event, code, message));
                }
                published.push(event.event_id());
            }
        }

        tracing::info!(total_published = published.len(), "batch publish complete");
        Ok(published)
    }

    async fn send(&self, entries: &[BusEntry]) -> EventResult<Vec<PublishStatus>> {
        let statuses = self.client.put_events(entries).await.map_err(|err| {
            tracing::error!(error = %err, "unexpected error publishing events");
            EventError::publish_failed(format!("unexpected error: {err}"), None)
        })?;

        if statuses.len() != entries.len() {
            return Err(EventError::publish_failed(
                format!(
                    "bus returned {} statuses for {} entries",
                    statuses.len(),
                    entries.len()
                ),
                None,
            ));
        }
        Ok(statuses)
    }
}

fn check_publishable(event: &Event) -> EventResult<()> {
    if event.source().is_empty() {
        return Err(EventError::publish_failed(
            "event must have a source",
            Some(event.event_id().to_string()),
        ));
    }
    Ok(())
}

fn rejected(event: &Event, code: &str, message: &str) -> EventError {
    tracing::error!(
        event_id = %event.event_id(),
        event_type = event.event_type(),
        tenant_id = event.tenant_id(),
        error_code = code,
        error_message = message,
        "event publish failed"
    );
    EventError::publish_failed(
        format!("{code} - {message}"),
        Some(event.event_id().to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBus {
        calls: Mutex<Vec<usize>>,
        reject_type: Option<String>,
    }

    #[async_trait]
    impl BusClient for RecordingBus {
        fn event_bus_name(&self) -> &str {
            "test-bus"
        }

        async fn put_events(&self, entries: &[BusEntry]) -> anyhow::Result<Vec<PublishStatus>> {
            self.calls.lock().unwrap().push(entries.len());
            Ok(entries
                .iter()
                .map(|e| match &self.reject_type {
                    Some(t) if *t == e.detail_type => PublishStatus::Rejected {
                        code: "Throttled".into(),
                        message: "slow down".into(),
                    },
                    _ => PublishStatus::Accepted { entry_id: None },
                })
                .collect())
        }
    }

    fn event(event_type: &str) -> Event {
        Event::builder()
            .event_type(event_type)
            .source("svc")
            .tenant_id("t-1")
            .build()
            .unwrap()
    }

    #[test]
    fn bus_entry_uses_pascal_case_keys() {
        let entry = event("a.created").to_bus_entry("bus").unwrap();
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["DetailType"], "a.created");
        assert_eq!(json["EventBusName"], "bus");
        let detail: serde_json::Value = serde_json::from_str(&entry.detail).unwrap();
        assert_eq!(detail["tenant_id"], "t-1");
    }

    #[tokio::test]
    async fn batches_are_chunked() {
        let bus = Arc::new(RecordingBus::default());
        let publisher = EventPublisher::new(bus.clone());
        let events: Vec<Event> = (0..23).map(|_| event("a.created")).collect();

        let ids = publisher.publish_batch(&events).await.unwrap();

        assert_eq!(ids.len(), 23);
        assert_eq!(*bus.calls.lock().unwrap(), vec![10, 10, 3]);
    }

    #[tokio::test]
    async fn rejected_entry_surfaces_as_error() {
        let bus = Arc::new(RecordingBus {
            reject_type: Some("a.bad".into()),
            ..RecordingBus::default()
        });
        let publisher = EventPublisher::new(bus);

        assert!(publisher.publish(&event("a.created")).await.is_ok());
        let err = publisher.publish(&event("a.bad")).await.unwrap_err();
        assert!(matches!(err, EventError::PublishFailed { event_id: Some(_), .. }));
    }

    #[tokio::test]
    async fn empty_source_is_refused_before_sending() {
        let bus = Arc::new(RecordingBus::default());
        let publisher = EventPublisher::new(bus.clone());
        let nameless = Event::builder()
            .event_type("a.created")
            .source("")
            .tenant_id("t-1")
            .build()
            .unwrap();

        assert!(publisher.publish(&nameless).await.is_err());
        assert!(bus.calls.lock().unwrap().is_empty());
    }
}
