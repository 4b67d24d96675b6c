use super::metadata::EventMetadata;
use super::payload::{EventPayload, EventSchema};
use crate::error::{EventError, EventResult};
use bon::bon;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// 默认的事件结构版本
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";

/// 未声明来源时使用的来源
pub const DEFAULT_SOURCE: &str = "unknown";

/// 扁平信封中的基础字段，其余字段归属类型化载荷
pub const BASE_FIELDS: [&str; 8] = [
    "event_id",
    "event_type",
    "source",
    "tenant_id",
    "timestamp",
    "version",
    "data",
    "metadata",
];

/// 类型化事件：不可变值对象，由反序列化管道产出
#[derive(Debug, Clone)]
pub struct Event {
    /// 事件唯一标识
    event_id: Uuid,
    /// 事件类型标签，用于路由
    event_type: String,
    /// 产生事件的服务
    source: String,
    /// 租户标识（多租户隔离边界）
    tenant_id: String,
    /// 事件创建时间（UTC）
    timestamp: DateTime<Utc>,
    /// 结构版本
    version: String,
    /// 通用载荷
    data: Map<String, Value>,
    /// 追踪/审计元数据
    metadata: EventMetadata,
    /// 类型化载荷；宽松模式下的兜底事件没有该字段
    payload: Option<Arc<dyn EventPayload>>,
}

#[bon]
impl Event {
    #[builder]
    pub fn new(
        #[builder(into)] event_type: String,
        #[builder(into)] source: String,
        #[builder(into)] tenant_id: String,
        #[builder(default = Uuid::new_v4())] event_id: Uuid,
        #[builder(default = Utc::now())] timestamp: DateTime<Utc>,
        #[builder(into, default = DEFAULT_SCHEMA_VERSION.to_string())] version: String,
        #[builder(default)] data: Map<String, Value>,
        #[builder(default)] metadata: EventMetadata,
        payload: Option<Arc<dyn EventPayload>>,
    ) -> EventResult<Self> {
        if event_type.is_empty() {
            return Err(EventError::invalid_event("event_type must not be empty"));
        }
        if tenant_id.is_empty() {
            return Err(EventError::invalid_event("tenant_id must not be empty"));
        }

        let mut data = data;
        if let Some(payload) = &payload {
            if payload.event_type() != event_type {
                return Err(EventError::SchemaViolation {
                    event_type,
                    reason: format!("payload belongs to '{}'", payload.event_type()),
                });
            }
            // 通用载荷为空时由类型化字段填充
            if data.is_empty() {
                data = payload.to_fields()?;
            }
        }

        Ok(Self {
            event_id,
            event_type,
            source,
            tenant_id,
            timestamp,
            version,
            data,
            metadata,
            payload,
        })
    }
}

impl Event {
    /// 由类型化载荷构造事件，来源取载荷的默认来源
    pub fn from_payload<S>(tenant_id: impl Into<String>, payload: S) -> EventResult<Self>
    where
        S: EventSchema,
    {
        Self::builder()
            .event_type(S::EVENT_TYPE)
            .source(S::SOURCE)
            .tenant_id(tenant_id)
            .payload(Arc::new(payload) as Arc<dyn EventPayload>)
            .build()
    }

    /// 仅由信封级字段构造无类型事件，忽略顶层的类型专属字段；缺少来源时取 `DEFAULT_SOURCE`
    pub fn untyped(fields: &Map<String, Value>) -> EventResult<Self> {
        let (base, _) = split_fields(fields);
        let base = EventFields::parse(base, Some(DEFAULT_SOURCE))?;
        base.into_event(None)
    }

    /// 按指定结构解析扁平信封
    pub fn from_schema_fields<S>(fields: &Map<String, Value>) -> EventResult<Self>
    where
        S: EventSchema,
    {
        let (base, rest) = split_fields(fields);
        let base = EventFields::parse(base, Some(S::SOURCE))?;

        let payload: S = serde_json::from_value(Value::Object(rest)).map_err(|err| {
            EventError::SchemaViolation {
                event_type: S::EVENT_TYPE.to_string(),
                reason: err.to_string(),
            }
        })?;
        payload
            .validate()
            .map_err(|reason| EventError::SchemaViolation {
                event_type: S::EVENT_TYPE.to_string(),
                reason,
            })?;

        base.into_event(Some(Arc::new(payload)))
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.correlation_id()
    }

    pub fn is_typed(&self) -> bool {
        self.payload.is_some()
    }

    pub fn payload(&self) -> Option<&dyn EventPayload> {
        self.payload.as_deref()
    }

    /// 取出具体类型的载荷
    pub fn payload_as<S>(&self) -> Option<&S>
    where
        S: EventSchema,
    {
        self.payload
            .as_deref()
            .and_then(|payload| payload.as_any().downcast_ref::<S>())
    }

    /// 展平为信封：基础字段与载荷字段位于同一层
    pub fn to_envelope(&self) -> EventResult<Map<String, Value>> {
        let mut fields = match &self.payload {
            Some(payload) => payload.to_fields()?,
            None => Map::new(),
        };

        fields.insert("event_id".into(), Value::String(self.event_id.to_string()));
        fields.insert("event_type".into(), Value::String(self.event_type.clone()));
        fields.insert("source".into(), Value::String(self.source.clone()));
        fields.insert("tenant_id".into(), Value::String(self.tenant_id.clone()));
        fields.insert("timestamp".into(), serde_json::to_value(self.timestamp)?);
        fields.insert("version".into(), Value::String(self.version.clone()));
        fields.insert("data".into(), Value::Object(self.data.clone()));
        fields.insert("metadata".into(), serde_json::to_value(&self.metadata)?);

        Ok(fields)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        let payload_eq = match (&self.payload, &other.payload) {
            (Some(left), Some(right)) => left.eq_payload(right.as_ref()),
            (None, None) => true,
            _ => false,
        };

        payload_eq
            && self.event_id == other.event_id
            && self.event_type == other.event_type
            && self.source == other.source
            && self.tenant_id == other.tenant_id
            && self.timestamp == other.timestamp
            && self.version == other.version
            && self.data == other.data
            && self.metadata == other.metadata
    }
}

fn split_fields(fields: &Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(k, _)| BASE_FIELDS.contains(&k.as_str()))
}

#[derive(Deserialize)]
struct EventFields {
    #[serde(default = "Uuid::new_v4")]
    event_id: Uuid,
    event_type: String,
    source: Option<String>,
    tenant_id: String,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default)]
    metadata: EventMetadata,
}

impl EventFields {
    fn parse(base: Map<String, Value>, default_source: Option<&str>) -> EventResult<Self> {
        let mut fields: EventFields = serde_json::from_value(Value::Object(base))
            .map_err(|err| EventError::invalid_event(err.to_string()))?;

        if fields.source.is_none() {
            fields.source = default_source.map(str::to_string);
        }

        Ok(fields)
    }

    fn into_event(self, payload: Option<Arc<dyn EventPayload>>) -> EventResult<Event> {
        let Some(source) = self.source else {
            return Err(EventError::invalid_event("missing field `source`"));
        };

        Event::builder()
            .event_id(self.event_id)
            .event_type(self.event_type)
            .source(source)
            .tenant_id(self.tenant_id)
            .timestamp(self.timestamp)
            .version(self.version)
            .data(self.data)
            .metadata(self.metadata)
            .maybe_payload(payload)
            .build()
    }
}

fn default_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}
