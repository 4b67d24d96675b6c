use super::outcome::{HandlerOutcome, HandlerResult, REASON_NOT_SUPPORTED};
use super::{BlockingEventHandler, EventHandler, HandlerDescriptor, HandlerObserver};
use crate::context::ExecutionContext;
use crate::event::Event;
use crate::fault::Fault;
use bon::Builder;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// 异步处理器的执行包装
///
/// 生命周期：安装上下文 → 类型检查 → 执行 → 产出结果并通知观察者 → 恢复上下文。
#[derive(Builder)]
pub struct HandlerRunner {
    handler: Arc<dyn EventHandler>,
    #[builder(default)]
    observers: Vec<Arc<dyn HandlerObserver>>,
}

impl HandlerRunner {
    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub fn handler_name(&self) -> &str {
        self.handler.handler_name()
    }

    /// 执行一次处理；故障与 panic 均转换为失败结果，从不向外抛出
    pub async fn process(&self, event: &Event) -> HandlerResult {
        ExecutionContext::for_event(event)
            .scope(self.run(event))
            .await
    }

    async fn run(&self, event: &Event) -> HandlerResult {
        let handler = self.handler.as_ref();
        if let Some(skipped) = unsupported(handler, event) {
            return skipped;
        }

        log_start(handler, event);
        let invoked = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
        finish(handler, &self.observers, event, invoked)
    }
}

/// 同步处理器的执行包装，语义与 `HandlerRunner` 一致
#[derive(Builder)]
pub struct BlockingHandlerRunner {
    handler: Arc<dyn BlockingEventHandler>,
    #[builder(default)]
    observers: Vec<Arc<dyn HandlerObserver>>,
}

impl BlockingHandlerRunner {
    pub fn handler_name(&self) -> &str {
        self.handler.handler_name()
    }

    pub fn process(&self, event: &Event) -> HandlerResult {
        ExecutionContext::for_event(event).sync_scope(|| {
            let handler = self.handler.as_ref();
            if let Some(skipped) = unsupported(handler, event) {
                return skipped;
            }

            log_start(handler, event);
            let invoked = catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
            finish(handler, &self.observers, event, invoked)
        })
    }
}

type Invoked = Result<Result<HandlerOutcome, Fault>, Box<dyn Any + Send>>;

fn unsupported<H>(handler: &H, event: &Event) -> Option<HandlerResult>
where
    H: HandlerDescriptor + ?Sized,
{
    let handled = handler.handled_event_type();
    if handled.matches(event.event_type()) {
        return None;
    }

    tracing::debug!(
        handler = handler.handler_name(),
        event_type = event.event_type(),
        supported_types = ?handled,
        "event type not supported"
    );
    Some(HandlerResult {
        event_id: event.event_id(),
        tenant_id: event.tenant_id().to_string(),
        outcome: HandlerOutcome::skipped(REASON_NOT_SUPPORTED),
    })
}

fn log_start<H>(handler: &H, event: &Event)
where
    H: HandlerDescriptor + ?Sized,
{
    tracing::info!(
        handler = handler.handler_name(),
        event_id = %event.event_id(),
        event_type = event.event_type(),
        tenant_id = event.tenant_id(),
        correlation_id = ?event.correlation_id(),
        "processing event"
    );
}

fn finish<H>(
    handler: &H,
    observers: &[Arc<dyn HandlerObserver>],
    event: &Event,
    invoked: Invoked,
) -> HandlerResult
where
    H: HandlerDescriptor + ?Sized,
{
    let name = handler.handler_name();
    let fault = match invoked {
        Ok(Ok(outcome)) => {
            return conclude(name, observers, event, outcome);
        }
        Ok(Err(fault)) => fault,
        Err(panic) => Fault::internal(panic_message(panic.as_ref())),
    };

    tracing::error!(
        handler = name,
        event_id = %event.event_id(),
        tenant_id = event.tenant_id(),
        kind = %fault.kind(),
        error = %fault,
        "event processing raised a fault"
    );
    let outcome = HandlerOutcome::from_fault(&fault, handler.is_retryable(&fault));
    conclude(name, observers, event, outcome)
}

fn conclude(
    name: &str,
    observers: &[Arc<dyn HandlerObserver>],
    event: &Event,
    outcome: HandlerOutcome,
) -> HandlerResult {
    let result = HandlerResult {
        event_id: event.event_id(),
        tenant_id: event.tenant_id().to_string(),
        outcome,
    };

    match &result.outcome {
        HandlerOutcome::Failure {
            error, retryable, ..
        } => {
            tracing::warn!(
                handler = name,
                event_id = %event.event_id(),
                tenant_id = event.tenant_id(),
                error = %error,
                should_retry = *retryable,
                "event processing failed"
            );
        }
        _ => {
            tracing::info!(
                handler = name,
                event_id = %event.event_id(),
                tenant_id = event.tenant_id(),
                skipped = result.outcome.is_skipped(),
                "event processed"
            );
        }
    }

    for observer in observers {
        let notified = if result.is_success() {
            observer.on_success(event, &result)
        } else {
            observer.on_error(event, &result)
        };
        if let Err(err) = notified {
            tracing::warn!(handler = name, error = %err, "handler observer failed");
        }
    }

    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".to_string()
    }
}
