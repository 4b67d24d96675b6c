use crate::fault::{Classify, Fault, FaultKind};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// 处理器未订阅该事件类型时的跳过原因
pub const REASON_NOT_SUPPORTED: &str = "event_type_not_supported";

/// 单次处理的结果
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Success {
        metadata: Map<String, Value>,
    },
    /// 跳过视为成功
    Skipped {
        reason: String,
        metadata: Map<String, Value>,
    },
    Failure {
        error: String,
        kind: FaultKind,
        retryable: bool,
        metadata: Map<String, Value>,
    },
}

impl HandlerOutcome {
    pub fn success() -> Self {
        Self::Success {
            metadata: Map::new(),
        }
    }

    pub fn success_with(metadata: Map<String, Value>) -> Self {
        Self::Success { metadata }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
            metadata: Map::new(),
        }
    }

    /// 处理器主动返回的失败；分类由是否可重试推断
    pub fn failure(error: impl Into<String>, retryable: bool) -> Self {
        let kind = if retryable {
            FaultKind::Transient
        } else {
            FaultKind::Permanent
        };
        Self::Failure {
            error: error.into(),
            kind,
            retryable,
            metadata: Map::new(),
        }
    }

    pub(crate) fn from_fault(fault: &Fault, retryable: bool) -> Self {
        Self::Failure {
            error: fault.message().to_string(),
            kind: fault.kind(),
            retryable,
            metadata: Map::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        !self.is_failure()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Failure { retryable: true, .. })
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        match self {
            Self::Success { metadata }
            | Self::Skipped { metadata, .. }
            | Self::Failure { metadata, .. } => metadata,
        }
    }
}

/// 带事件标识的处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResult {
    pub event_id: Uuid,
    pub tenant_id: String,
    pub outcome: HandlerOutcome,
}

impl HandlerResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            HandlerOutcome::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    /// 失败结果作为 `Err`，便于交给重试引擎
    pub fn into_result(self) -> Result<Self, Self> {
        if self.outcome.is_failure() {
            Err(self)
        } else {
            Ok(self)
        }
    }

    /// 失败结果还原为故障
    pub fn to_fault(&self) -> Option<Fault> {
        match &self.outcome {
            HandlerOutcome::Failure { error, kind, .. } => Some(Fault::new(*kind, error.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for HandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            HandlerOutcome::Success { .. } => write!(f, "event {} processed", self.event_id),
            HandlerOutcome::Skipped { reason, .. } => {
                write!(f, "event {} skipped: {reason}", self.event_id)
            }
            HandlerOutcome::Failure { error, .. } => f.write_str(error),
        }
    }
}

impl Classify for HandlerResult {
    fn fault_kind(&self) -> FaultKind {
        match &self.outcome {
            HandlerOutcome::Failure { kind, .. } => *kind,
            _ => FaultKind::Internal,
        }
    }

    fn retry_hint(&self) -> Option<bool> {
        match &self.outcome {
            HandlerOutcome::Failure { retryable, .. } => Some(*retryable),
            _ => None,
        }
    }
}
