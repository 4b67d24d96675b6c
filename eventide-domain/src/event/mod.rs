//! 类型化事件（Typed Event）
//!
//! 定义事件的基础字段（`Event`）、追踪元数据（`EventMetadata`），
//! 以及类型化载荷需要实现的 `EventSchema` 与其类型擦除形态 `EventPayload`。

mod metadata;
mod payload;
mod typed_event;

pub use metadata::EventMetadata;
pub use payload::{EventPayload, EventSchema};
pub use typed_event::{BASE_FIELDS, DEFAULT_SCHEMA_VERSION, DEFAULT_SOURCE, Event};
