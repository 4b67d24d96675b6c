//! 内核事件结构
//!
//! 平台内核发布的实体/结构事件。注册需显式调用 `register_core_events`，
//! 不在模块加载时产生副作用。

mod entity;
mod schema;

pub use entity::{EntityCreated, EntityDeleted, EntityUpdated};
pub use schema::{SchemaCreated, SchemaUpdated};

use crate::error::EventResult;
use crate::event::EventSchema;
use crate::registry::EventRegistry;

/// 向注册表登记内核事件；已登记的标签跳过，可重复调用
pub fn register_core_events(registry: &EventRegistry) -> EventResult<()> {
    register_missing::<EntityCreated>(registry)?;
    register_missing::<EntityUpdated>(registry)?;
    register_missing::<EntityDeleted>(registry)?;
    register_missing::<SchemaCreated>(registry)?;
    register_missing::<SchemaUpdated>(registry)?;
    Ok(())
}

fn register_missing<S>(registry: &EventRegistry) -> EventResult<()>
where
    S: EventSchema,
{
    if registry.contains(S::EVENT_TYPE) {
        return Ok(());
    }
    registry.register_schema::<S>()
}
