//! 应用层：将反序列化管道、处理器、重试与失败追踪串成一次完整分发
//!
pub mod dispatcher;
pub mod error;

pub use dispatcher::{DispatchEntry, DispatchReport, EventDispatcher};
pub use error::AppError;
