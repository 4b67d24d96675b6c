//! 故障分类（Fault）
//!
//! 以封闭的 `FaultKind` 集合取代按异常类型判断的做法：
//! 处理器与重试引擎只依据分类决定是否重试。
//!
use crate::error::EventError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// 故障类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// 连接被拒绝/重置等网络故障
    Connection,
    /// 超时
    Timeout,
    /// 其他 I/O 故障
    Io,
    /// 调用方显式声明的瞬时故障
    Transient,
    /// 数据校验失败
    Validation,
    /// 类型不匹配
    TypeMismatch,
    /// 缺少键/记录
    MissingKey,
    /// 调用方显式声明的永久故障
    Permanent,
    /// 未分类故障（含处理器 panic）
    Internal,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Io => "io",
            Self::Transient => "transient",
            Self::Validation => "validation",
            Self::TypeMismatch => "type_mismatch",
            Self::MissingKey => "missing_key",
            Self::Permanent => "permanent",
            Self::Internal => "internal",
        }
    }

    /// 瞬时/连接类故障
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Timeout | Self::Io | Self::Transient
        )
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 可分类的故障
pub trait Classify {
    fn fault_kind(&self) -> FaultKind;

    /// 产生方对是否重试的判断；`Some(false)` 时重试引擎直接停止
    fn retry_hint(&self) -> Option<bool> {
        None
    }
}

/// 处理器/工作单元抛出的故障
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Fault {
    kind: FaultKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// 包装任意错误，消息取自错误本身
    pub fn from_error(kind: FaultKind, err: impl Into<anyhow::Error>) -> Self {
        let err = err.into();
        Self {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Timeout, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Transient, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Validation, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Permanent, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Internal, message)
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Classify for Fault {
    fn fault_kind(&self) -> FaultKind {
        self.kind
    }
}

impl Classify for io::Error {
    fn fault_kind(&self) -> FaultKind {
        match self.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe => FaultKind::Connection,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FaultKind::Timeout,
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => FaultKind::Validation,
            io::ErrorKind::NotFound => FaultKind::MissingKey,
            _ => FaultKind::Io,
        }
    }
}

impl Classify for serde_json::Error {
    fn fault_kind(&self) -> FaultKind {
        match self.classify() {
            serde_json::error::Category::Io => FaultKind::Io,
            _ => FaultKind::Validation,
        }
    }
}

impl Classify for EventError {
    fn fault_kind(&self) -> FaultKind {
        match self {
            EventError::InvalidEvent { .. }
            | EventError::MalformedEnvelope { .. }
            | EventError::SchemaViolation { .. } => FaultKind::Validation,
            EventError::UnknownType { .. } => FaultKind::MissingKey,
            EventError::PublishFailed { .. } => FaultKind::Transient,
            EventError::Serde { source } => source.fault_kind(),
            _ => FaultKind::Permanent,
        }
    }
}

impl Classify for anyhow::Error {
    fn fault_kind(&self) -> FaultKind {
        if let Some(fault) = self.downcast_ref::<Fault>() {
            fault.kind
        } else if let Some(err) = self.downcast_ref::<io::Error>() {
            err.fault_kind()
        } else if let Some(err) = self.downcast_ref::<EventError>() {
            err.fault_kind()
        } else {
            FaultKind::Internal
        }
    }
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Self::from_error(err.fault_kind(), err)
    }
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(err.fault_kind(), err)
    }
}

impl From<EventError> for Fault {
    fn from(err: EventError) -> Self {
        Self::from_error(err.fault_kind(), err)
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        Self::from_error(err.fault_kind(), err)
    }
}
