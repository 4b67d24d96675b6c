use crate::error::{EventError, EventResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// 类型化事件载荷需要满足的能力边界
///
/// 通常通过 `#[event_schema(event_type = "...", source = "...")]` 宏实现，
/// 载荷字段在扁平信封中与基础字段并列出现。
pub trait EventSchema:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件类型标签（形如 `entity.created`）
    const EVENT_TYPE: &'static str;

    /// 信封缺失 `source` 时使用的默认来源
    const SOURCE: &'static str;

    /// 载荷级业务校验，返回可读的失败原因
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 类型擦除后的载荷，便于在注册表与事件中统一持有
pub trait EventPayload: Any + fmt::Debug + Send + Sync {
    fn event_type(&self) -> &'static str;

    /// 载荷字段（序列化为 JSON 对象）
    fn to_fields(&self) -> EventResult<Map<String, Value>>;

    fn as_any(&self) -> &dyn Any;

    /// 按值比较两个载荷
    fn eq_payload(&self, other: &dyn EventPayload) -> bool;
}

impl<T> EventPayload for T
where
    T: EventSchema,
{
    fn event_type(&self) -> &'static str {
        T::EVENT_TYPE
    }

    fn to_fields(&self) -> EventResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(EventError::SchemaViolation {
                event_type: T::EVENT_TYPE.to_string(),
                reason: format!("payload must serialize to an object, got {other}"),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_payload(&self, other: &dyn EventPayload) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}
