//! 弹性事件分发核心（eventide-domain）
//!
//! 将异构的入站事件信封转换为类型化事件，并以可恢复的方式交给处理器执行：
//! - 事件模型（`event`）与内核事件结构（`model`）
//! - 类型注册表（`registry`）与反序列化管道（`consumer`）
//! - 执行上下文（`context`）：每次分发期间的租户与关联 ID
//! - 处理器与执行包装（`handler`）、故障分类（`fault`）
//! - 重试引擎（`retry`）与失败追踪/告警（`dead_letter`）
//! - 发布接缝（`publisher`）与接入校验（`validator`）
//!
//! 本 crate 不包含传输实现，也不安装日志订阅者；所有诊断信息通过 `tracing` 发出，
//! 由宿主程序决定如何收集。
//!
//! 典型用法：
//! 1. 使用 `#[event_schema(...)]` 定义载荷并登记到 `EventRegistry`；
//! 2. 通过 `EventConsumer` 将信封解析为 `Event`；
//! 3. 用 `HandlerRunner` 包装处理器，交给 `RetryPolicy::execute_async` 执行；
//! 4. 最终失败交给 `DeadLetterHandler::record_failure`。
//!
pub mod consumer;
pub mod context;
pub mod dead_letter;
pub mod error;
pub mod event;
pub mod fault;
pub mod handler;
pub mod model;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod validator;

pub use eventide_macros::event_schema;

// 允许在本 crate 内部通过 ::eventide_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::eventide_domain 路径。
extern crate self as eventide_domain;
