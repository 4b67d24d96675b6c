//! 事件核心统一错误定义
//!
//! 覆盖信封解析、类型注册、租户隔离与配置校验等失败场景。
//! 反序列化类错误一律直接返回给调用方，本层不做重试（格式错误不是瞬时故障）。
//!
use thiserror::Error;

/// 原始文本在错误中保留的最大字符数，避免敏感数据整段进入日志
const RAW_PREVIEW_LIMIT: usize = 500;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventError {
    // --- 信封/解析 ---
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },
    #[error("unknown event type: '{event_type}'")]
    UnknownType { event_type: String },
    #[error("event tenant_id '{tenant_id}' not in allowed tenants")]
    TenantRejected {
        tenant_id: String,
        event_type: Option<String>,
    },
    #[error("unable to determine event source from envelope")]
    UnrecognizedSource,
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        reason: String,
        raw: Option<String>,
    },
    #[error("schema violation: type={event_type}, reason={reason}")]
    SchemaViolation { event_type: String, reason: String },

    // --- 注册表 ---
    #[error("event type '{event_type}' is already registered")]
    DuplicateType { event_type: String },

    // --- 发布 ---
    #[error("failed to publish event: {reason}")]
    PublishFailed {
        reason: String,
        event_id: Option<String>,
    },

    // --- 序列化/配置 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },
}

impl EventError {
    pub fn invalid_event(reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn publish_failed(reason: impl Into<String>, event_id: Option<String>) -> Self {
        Self::PublishFailed {
            reason: reason.into(),
            event_id,
        }
    }

    /// 文本无法解析为 JSON 时构造，原文截断保留
    pub fn malformed(context: &str, err: &serde_json::Error, raw: &str) -> Self {
        let raw = if raw.chars().count() > RAW_PREVIEW_LIMIT {
            raw.chars().take(RAW_PREVIEW_LIMIT).collect()
        } else {
            raw.to_string()
        };

        Self::MalformedEnvelope {
            reason: format!("invalid JSON in {context}: {err}"),
            raw: Some(raw),
        }
    }

    /// 错误关联的事件类型（若可得）
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::UnknownType { event_type }
            | Self::SchemaViolation { event_type, .. }
            | Self::DuplicateType { event_type } => Some(event_type),
            Self::TenantRejected { event_type, .. } => event_type.as_deref(),
            _ => None,
        }
    }
}

/// 统一 Result 类型别名
pub type EventResult<T> = Result<T, EventError>;
