use async_trait::async_trait;
use eventide_application::{AppError, EventDispatcher};
use eventide_domain::consumer::{ConsumerConfig, EventConsumer};
use eventide_domain::context::{current_correlation_id, current_tenant};
use eventide_domain::dead_letter::{DeadLetterConfig, DeadLetterHandler, FailedEvent, FailureStore};
use eventide_domain::error::EventError;
use eventide_domain::event::Event;
use eventide_domain::fault::Fault;
use eventide_domain::handler::{
    EventHandler, HandledEventType, HandlerDescriptor, HandlerObserver, HandlerOutcome,
    HandlerResult,
};
use eventide_domain::model::register_core_events;
use eventide_domain::registry::EventRegistry;
use eventide_domain::retry::{FixedBackoff, RetryConfig, RetryPolicy};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// 记录每次调用时看到的上下文
#[derive(Default)]
struct SearchIndexer {
    seen: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl HandlerDescriptor for SearchIndexer {
    fn handler_name(&self) -> &str {
        "search-indexer"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::Many(vec!["entity.created".into(), "entity.deleted".into()])
    }
}

#[async_trait]
impl EventHandler for SearchIndexer {
    async fn handle(&self, _event: &Event) -> Result<HandlerOutcome, Fault> {
        self.seen
            .lock()
            .unwrap()
            .push((current_tenant(), current_correlation_id()));
        Ok(HandlerOutcome::success())
    }
}

/// 始终超时的全量订阅者
#[derive(Default)]
struct Webhook {
    calls: AtomicU32,
}

impl HandlerDescriptor for Webhook {
    fn handler_name(&self) -> &str {
        "webhook"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::All
    }
}

#[async_trait]
impl EventHandler for Webhook {
    async fn handle(&self, _event: &Event) -> Result<HandlerOutcome, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Fault::timeout("upstream did not answer"))
    }
}

#[derive(Default)]
struct Tally {
    ok: AtomicU32,
    err: AtomicU32,
}

impl HandlerObserver for Tally {
    fn on_success(&self, _event: &Event, _result: &HandlerResult) -> anyhow::Result<()> {
        self.ok.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_error(&self, _event: &Event, _result: &HandlerResult) -> anyhow::Result<()> {
        self.err.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn consumer(config: ConsumerConfig) -> EventConsumer {
    let registry = Arc::new(EventRegistry::new());
    register_core_events(&registry).unwrap();
    EventConsumer::with_registry(registry, config)
}

fn retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::with_backoff(
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(100),
            ..RetryConfig::default()
        },
        Arc::new(FixedBackoff),
    )
    .unwrap()
}

fn created(tenant: &str, correlation: &str) -> Value {
    json!({
        "event_type": "entity.created",
        "tenant_id": tenant,
        "entity_id": Uuid::new_v4(),
        "entity_type": "Article",
        "metadata": {"correlation_id": correlation}
    })
}

#[tokio::test(start_paused = true)]
async fn batch_runs_every_matching_handler_and_dead_letters_failures() {
    let indexer = Arc::new(SearchIndexer::default());
    let webhook = Arc::new(Webhook::default());
    let tally = Arc::new(Tally::default());
    let stored = Arc::new(Mutex::new(Vec::<FailedEvent>::new()));
    let sink = stored.clone();
    let store: Arc<dyn FailureStore> = Arc::new(move |f: &FailedEvent| -> anyhow::Result<()> {
        sink.lock().unwrap().push(f.clone());
        Ok(())
    });

    let dispatcher = EventDispatcher::builder()
        .consumer(consumer(ConsumerConfig::default()))
        .handlers(vec![
            webhook.clone() as Arc<dyn EventHandler>,
            indexer.clone() as Arc<dyn EventHandler>,
        ])
        .observers(vec![tally.clone() as Arc<dyn HandlerObserver>])
        .retry(retry(2))
        .dead_letter(
            DeadLetterHandler::builder()
                .store(store)
                .config(DeadLetterConfig::default())
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let batch = json!({"Records": [
        {"eventSource": "aws:sqs", "body": created("t-1", "c-1").to_string()},
        {"eventSource": "aws:sqs", "body": created("t-2", "c-2").to_string()},
    ]});
    let report = dispatcher.dispatch(&batch).await.unwrap();

    assert_eq!(report.event_count, 2);
    assert_eq!(report.unhandled, 0);
    let handlers: Vec<&str> = report.entries.iter().map(|e| e.handler_name.as_str()).collect();
    assert_eq!(
        handlers,
        vec!["search-indexer", "webhook", "search-indexer", "webhook"]
    );
    assert_eq!(report.succeeded(), 2);
    assert!(!report.is_success());

    let webhook_entry = &report.entries[1];
    assert_eq!(webhook_entry.attempts, 3);
    assert_eq!(webhook_entry.total_delay, Duration::from_millis(200));
    assert_eq!(webhook.calls.load(Ordering::SeqCst), 6);

    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].error_type, "timeout");
    assert_eq!(report.failed[0].attempt_count, 3);
    assert_eq!(report.failed[0].metadata["total_delay_ms"], json!(200));
    assert_eq!(stored.lock().unwrap().len(), 2);
    assert_eq!(
        dispatcher.dead_letter().failure_count("webhook", "entity.created"),
        2
    );

    assert_eq!(
        *indexer.seen.lock().unwrap(),
        vec![
            (Some("t-1".to_string()), Some("c-1".to_string())),
            (Some("t-2".to_string()), Some("c-2".to_string())),
        ]
    );
    assert_eq!(tally.ok.load(Ordering::SeqCst), 2);
    assert_eq!(tally.err.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn envelope_faults_surface_without_running_handlers() {
    let webhook = Arc::new(Webhook::default());
    let dispatcher = EventDispatcher::builder()
        .consumer(consumer(
            ConsumerConfig::default().with_allowed_tenants(["t-1"]),
        ))
        .handlers(vec![webhook.clone() as Arc<dyn EventHandler>])
        .build()
        .unwrap();

    let err = dispatcher.dispatch(&created("t-9", "c-1")).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Domain(EventError::TenantRejected { ref tenant_id, .. }) if tenant_id == "t-9"
    ));

    let err = dispatcher
        .dispatch(&json!({"something": "else"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Domain(EventError::UnrecognizedSource)));
    assert_eq!(webhook.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn lenient_unknown_type_without_subscriber_is_unhandled() {
    let indexer = Arc::new(SearchIndexer::default());
    let dispatcher = EventDispatcher::builder()
        .consumer(consumer(ConsumerConfig::lenient()))
        .handlers(vec![indexer.clone() as Arc<dyn EventHandler>])
        .build()
        .unwrap();

    let report = dispatcher
        .dispatch(&json!({
            "event_type": "billing.invoiced",
            "tenant_id": "t-1",
            "data": {"amount": 3}
        }))
        .await
        .unwrap();

    assert_eq!(report.event_count, 1);
    assert_eq!(report.unhandled, 1);
    assert!(indexer.seen.lock().unwrap().is_empty());
}
