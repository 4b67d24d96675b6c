//! 结构事件：实体类型的结构定义被创建或修改时发布
//!
use eventide_macros::event_schema;
use serde_json::{Map, Value};
use uuid::Uuid;

#[event_schema(event_type = "schema.created", source = "mkg-kernel")]
pub struct SchemaCreated {
    pub schema_id: Uuid,
    #[schema(non_empty)]
    pub entity_type: String,
    /// 属性定义列表
    #[serde(default)]
    pub attributes: Vec<Map<String, Value>>,
}

#[event_schema(event_type = "schema.updated", source = "mkg-kernel")]
pub struct SchemaUpdated {
    pub schema_id: Uuid,
    #[schema(non_empty)]
    pub entity_type: String,
    #[serde(default)]
    pub added_attributes: Vec<Map<String, Value>>,
    /// 被移除的属性名
    #[serde(default)]
    pub removed_attributes: Vec<String>,
    #[serde(default)]
    pub modified_attributes: Vec<Map<String, Value>>,
}
