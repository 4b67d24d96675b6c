use async_trait::async_trait;
use eventide_application::EventDispatcher;
use eventide_domain::consumer::{ConsumerConfig, EventConsumer};
use eventide_domain::context::{current_correlation_id, current_tenant};
use eventide_domain::dead_letter::{DeadLetterConfig, DeadLetterHandler, FailedEvent};
use eventide_domain::event::{Event, EventMetadata};
use eventide_domain::event_schema;
use eventide_domain::fault::Fault;
use eventide_domain::handler::{
    EventHandler, HandledEventType, HandlerDescriptor, HandlerObserver, HandlerOutcome,
    HandlerResult,
};
use eventide_domain::model::{EntityCreated, register_core_events};
use eventide_domain::publisher::{BusClient, BusEntry, EventPublisher, PublishStatus};
use eventide_domain::registry::EventRegistry;
use eventide_domain::retry::{BackoffStrategy, RetryConfig, RetryPolicy};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[event_schema(event_type = "article.published", source = "cms")]
struct ArticlePublished {
    article_id: Uuid,
    #[schema(non_empty)]
    title: String,
}

/// 维护搜索索引：只关心实体创建与文章发布
struct SearchIndexer;

impl HandlerDescriptor for SearchIndexer {
    fn handler_name(&self) -> &str {
        "search-indexer"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::Many(vec!["entity.created".into(), "article.published".into()])
    }
}

#[async_trait]
impl EventHandler for SearchIndexer {
    async fn handle(&self, event: &Event) -> Result<HandlerOutcome, Fault> {
        if let Some(article) = event.payload_as::<ArticlePublished>() {
            tracing::info!(
                article_id = %article.article_id,
                title = %article.title,
                tenant = ?current_tenant(),
                "indexing article"
            );
        } else if let Some(entity) = event.payload_as::<EntityCreated>() {
            tracing::info!(
                entity_id = %entity.entity_id,
                entity_type = %entity.entity_type,
                tenant = ?current_tenant(),
                "indexing entity"
            );
        }
        Ok(HandlerOutcome::success())
    }
}

/// 下游通知：前两次连接失败，之后恢复；`deny` 租户永远超时
#[derive(Default)]
struct Notifier {
    calls: AtomicU32,
}

impl HandlerDescriptor for Notifier {
    fn handler_name(&self) -> &str {
        "notifier"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::All
    }
}

#[async_trait]
impl EventHandler for Notifier {
    async fn handle(&self, event: &Event) -> Result<HandlerOutcome, Fault> {
        if event.tenant_id() == "deny" {
            return Err(Fault::timeout("notification gateway timed out"));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            return Err(Fault::connection(format!("connection refused (call {n})")));
        }
        tracing::info!(correlation_id = ?current_correlation_id(), "notification sent");
        Ok(HandlerOutcome::success())
    }
}

struct AuditLog;

impl HandlerObserver for AuditLog {
    fn on_error(&self, event: &Event, result: &HandlerResult) -> anyhow::Result<()> {
        tracing::debug!(event_id = %event.event_id(), error = %result, "audit: handler failure");
        Ok(())
    }
}

/// 进程内总线：记录条目，供演示回放
#[derive(Default)]
struct InMemoryBus {
    entries: Mutex<Vec<BusEntry>>,
}

#[async_trait]
impl BusClient for InMemoryBus {
    fn event_bus_name(&self) -> &str {
        "demo-bus"
    }

    async fn put_events(&self, entries: &[BusEntry]) -> anyhow::Result<Vec<PublishStatus>> {
        let mut stored = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("bus lock poisoned"))?;
        stored.extend_from_slice(entries);
        Ok(entries
            .iter()
            .map(|_| PublishStatus::Accepted {
                entry_id: Some(Uuid::new_v4().to_string()),
            })
            .collect())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let registry = Arc::new(EventRegistry::new());
    register_core_events(&registry)?;
    registry.register_schema::<ArticlePublished>()?;

    let dead_letter = DeadLetterHandler::builder()
        .store(Arc::new(|failed: &FailedEvent| -> anyhow::Result<()> {
            tracing::warn!(record = %failed.to_json(), "dead letter stored");
            Ok(())
        }))
        .alert(Arc::new(|failed: &FailedEvent| -> anyhow::Result<()> {
            tracing::error!(handler = %failed.handler_name, "ALERT: repeated failures");
            Ok(())
        }))
        .config(DeadLetterConfig {
            alert_threshold: 2,
            ..DeadLetterConfig::default()
        })
        .build()?;

    let retry = RetryPolicy::new(RetryConfig {
        max_retries: 3,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(400),
        backoff_strategy: BackoffStrategy::ExponentialJitter,
        ..RetryConfig::default()
    })?;

    let dispatcher = EventDispatcher::builder()
        .consumer(EventConsumer::with_registry(
            registry,
            ConsumerConfig::lenient(),
        ))
        .handlers(vec![
            Arc::new(SearchIndexer) as Arc<dyn EventHandler>,
            Arc::new(Notifier::default()) as Arc<dyn EventHandler>,
        ])
        .observers(vec![Arc::new(AuditLog) as Arc<dyn HandlerObserver>])
        .retry(retry)
        .dead_letter(dead_letter)
        .build()?;

    // 先经由总线发布一条类型化事件，再把总线条目当作入站记录回放
    let bus = Arc::new(InMemoryBus::default());
    let publisher = EventPublisher::new(bus.clone());
    let article = Event::builder()
        .event_type("article.published")
        .source("cms")
        .tenant_id("acme")
        .metadata(EventMetadata::builder().correlation_id("req-1").build())
        .payload(Arc::new(ArticlePublished {
            article_id: Uuid::new_v4(),
            title: "Hello".to_string(),
        }))
        .build()?;
    publisher.publish(&article).await?;

    let published: Vec<BusEntry> = bus
        .entries
        .lock()
        .map_err(|_| anyhow::anyhow!("bus lock poisoned"))?
        .clone();

    let mut records: Vec<Value> = published
        .iter()
        .map(|entry| json!({"eventSource": "aws:sqs", "body": entry.detail}))
        .collect();
    records.push(json!({
        "eventSource": "aws:sqs",
        "body": json!({
            "detail-type": "entity.created",
            "detail": {
                "event_type": "entity.created",
                "tenant_id": "acme",
                "entity_id": Uuid::new_v4(),
                "entity_type": "Article"
            }
        }).to_string()
    }));
    records.push(json!({
        "eventSource": "custom:stream",
        "body": {"event_type": "billing.invoiced", "tenant_id": "deny", "data": {"amount": 12}}
    }));

    let report = dispatcher.dispatch(&json!({ "Records": records })).await?;
    for entry in &report.entries {
        println!(
            "{} -> {} after {} attempt(s), waited {:?}",
            entry.handler_name,
            if entry.is_success() { "ok" } else { "failed" },
            entry.attempts,
            entry.total_delay
        );
    }
    println!(
        "events={}, succeeded={}, dead-lettered={}",
        report.event_count,
        report.succeeded(),
        report.failed.len()
    );

    Ok(())
}
