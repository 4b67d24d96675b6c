//! 实体事件：内核在实体创建/更新/删除时发布
//!
use eventide_macros::event_schema;
use serde_json::{Map, Value};
use uuid::Uuid;

/// 实体已创建
#[event_schema(event_type = "entity.created", source = "mkg-kernel")]
pub struct EntityCreated {
    pub entity_id: Uuid,
    /// 实体类型（如 Article、Asset）
    #[schema(non_empty)]
    pub entity_type: String,
    /// 初始属性值
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// 实体已更新
#[event_schema(event_type = "entity.updated", source = "mkg-kernel")]
pub struct EntityUpdated {
    pub entity_id: Uuid,
    #[schema(non_empty)]
    pub entity_type: String,
    /// 被修改的属性名
    #[serde(default)]
    pub changed_attributes: Vec<String>,
    #[serde(default)]
    pub previous_values: Map<String, Value>,
    #[serde(default)]
    pub new_values: Map<String, Value>,
}

/// 实体已删除
#[event_schema(event_type = "entity.deleted", source = "mkg-kernel")]
pub struct EntityDeleted {
    pub entity_id: Uuid,
    #[schema(non_empty)]
    pub entity_type: String,
    /// 软删除（可恢复）
    #[serde(default = "soft_delete_default")]
    pub is_soft_delete: bool,
}

fn soft_delete_default() -> bool {
    true
}
