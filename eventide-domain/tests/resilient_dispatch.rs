use async_trait::async_trait;
use eventide_domain::context::current_tenant;
use eventide_domain::dead_letter::{DeadLetterConfig, DeadLetterHandler, FailedEvent, FailureAlert};
use eventide_domain::event::Event;
use eventide_domain::fault::{Fault, FaultKind};
use eventide_domain::handler::{
    EventHandler, HandledEventType, HandlerDescriptor, HandlerOutcome, HandlerRunner,
};
use eventide_domain::retry::{FixedBackoff, RetryConfig, RetryPolicy};
use serde_json::Map;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 前 `fail_times` 次以 `kind` 失败，之后成功
struct Flaky {
    kind: FaultKind,
    fail_times: u32,
    calls: AtomicU32,
    tenants: Mutex<Vec<Option<String>>>,
}

impl Flaky {
    fn new(kind: FaultKind, fail_times: u32) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail_times,
            calls: AtomicU32::new(0),
            tenants: Mutex::new(Vec::new()),
        })
    }
}

impl HandlerDescriptor for Flaky {
    fn handler_name(&self) -> &str {
        "flaky"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::All
    }
}

#[async_trait]
impl EventHandler for Flaky {
    async fn handle(&self, _event: &Event) -> Result<HandlerOutcome, Fault> {
        self.tenants.lock().unwrap().push(current_tenant());
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.fail_times {
            Err(Fault::new(self.kind, format!("attempt {n} failed")))
        } else {
            Ok(HandlerOutcome::success())
        }
    }
}

fn event() -> Event {
    Event::builder()
        .event_type("order.placed")
        .source("shop")
        .tenant_id("t-1")
        .build()
        .unwrap()
}

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::with_backoff(
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(250),
            ..RetryConfig::default()
        },
        Arc::new(FixedBackoff),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn transient_faults_recover_within_budget() {
    let handler = Flaky::new(FaultKind::Connection, 2);
    let runner = HandlerRunner::builder().handler(handler.clone()).build();
    let ev = event();

    let outcome = policy(3)
        .execute_async(|| async { runner.process(&ev).await.into_result() })
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.total_delay, Duration::from_millis(500));
    // 每次重试都重新安装上下文
    assert_eq!(
        *handler.tenants.lock().unwrap(),
        vec![Some("t-1".to_string()); 3]
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_land_in_dead_letter() {
    let handler = Flaky::new(FaultKind::Timeout, u32::MAX);
    let runner = HandlerRunner::builder().handler(handler.clone()).build();
    let stored = Arc::new(Mutex::new(Vec::<FailedEvent>::new()));
    let sink = stored.clone();
    let alerts = Arc::new(AtomicUsize::new(0));
    let seen = alerts.clone();
    let alert: Arc<dyn FailureAlert> = Arc::new(move |_: &FailedEvent| -> anyhow::Result<()> {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let dlq = DeadLetterHandler::builder()
        .store(Arc::new(move |f: &FailedEvent| -> anyhow::Result<()> {
            sink.lock().unwrap().push(f.clone());
            Ok(())
        }))
        .alert(alert)
        .config(DeadLetterConfig {
            alert_threshold: 2,
            ..DeadLetterConfig::default()
        })
        .build()
        .unwrap();

    let ev = event();
    for round in 1..=2 {
        let outcome = policy(2)
            .execute_async(|| async { runner.process(&ev).await.into_result() })
            .await;
        assert_eq!(outcome.attempts, 3);

        let last = outcome.last_error.unwrap();
        dlq.record_failure(&ev, &last, runner.handler_name(), outcome.attempts, Map::new());
        assert_eq!(dlq.failure_count("flaky", "order.placed"), round);
    }

    let stored = stored.lock().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].error_type, "timeout");
    assert_eq!(stored[0].attempt_count, 3);
    assert_eq!(alerts.load(Ordering::SeqCst), 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn permanent_fault_is_tried_once() {
    let handler = Flaky::new(FaultKind::Validation, u32::MAX);
    let runner = HandlerRunner::builder().handler(handler.clone()).build();
    let ev = event();

    let outcome = policy(5)
        .execute_async(|| async { runner.process(&ev).await.into_result() })
        .await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn blocking_execute_shares_decisions() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(RetryConfig {
        max_retries: 4,
        base_delay: Duration::ZERO,
        ..RetryConfig::default()
    })
    .unwrap();

    let outcome = policy.execute(|| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        match n {
            0 => Err(Fault::from(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            ))),
            1 => Err(Fault::transient("busy")),
            _ => Ok(n),
        }
    });

    assert_eq!(outcome.value, Some(2));
    assert_eq!(outcome.attempts, 3);
}
