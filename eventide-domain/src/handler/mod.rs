//! 事件处理器（EventHandler）与执行包装（HandlerRunner）
//!
//! 定义消费某类/多类/全部事件的处理逻辑与元信息（名称、订阅类型、可重试判定），
//! 由 `HandlerRunner` 负责安装执行上下文、捕获故障与 panic、统一产出 `HandlerResult`。
//!
mod outcome;
mod runner;

pub use outcome::{HandlerOutcome, HandlerResult, REASON_NOT_SUPPORTED};
pub use runner::{BlockingHandlerRunner, HandlerRunner};

use crate::event::Event;
use crate::fault::Fault;
use async_trait::async_trait;

/// 处理器订阅的事件类型；空的 `Many` 等同于 `All`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
    All,
}

impl HandledEventType {
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::One(t) => t == event_type,
            Self::Many(ts) => ts.is_empty() || ts.iter().any(|t| t == event_type),
        }
    }
}

/// 处理器元信息
pub trait HandlerDescriptor: Send + Sync {
    /// 处理器名称（用于日志、失败计数与审计）
    fn handler_name(&self) -> &str;

    /// 返回该处理器支持的事件类型
    fn handled_event_type(&self) -> HandledEventType;

    /// 故障是否值得重试；默认仅连接/超时/IO/瞬时故障
    fn is_retryable(&self, fault: &Fault) -> bool {
        fault.kind().is_transient()
    }
}

/// 事件处理器：异步处理某一类型的事件
#[async_trait]
pub trait EventHandler: HandlerDescriptor {
    async fn handle(&self, event: &Event) -> Result<HandlerOutcome, Fault>;
}

/// 同步事件处理器
pub trait BlockingEventHandler: HandlerDescriptor {
    fn handle(&self, event: &Event) -> Result<HandlerOutcome, Fault>;
}

/// 处理结果观察者；返回的错误只记录日志，不影响结果
pub trait HandlerObserver: Send + Sync {
    fn on_success(&self, _event: &Event, _result: &HandlerResult) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_error(&self, _event: &Event, _result: &HandlerResult) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handled_event_type_matching() {
        assert!(HandledEventType::All.matches("anything"));
        assert!(HandledEventType::One("a.b".into()).matches("a.b"));
        assert!(!HandledEventType::One("a.b".into()).matches("a.c"));

        let many = HandledEventType::Many(vec!["a.b".into(), "a.c".into()]);
        assert!(many.matches("a.c"));
        assert!(!many.matches("a.d"));
    }

    #[test]
    fn empty_many_accepts_every_type() {
        let empty = HandledEventType::Many(Vec::new());
        assert!(empty.matches("a.b"));
        assert!(empty.matches("anything.else"));
    }
}
