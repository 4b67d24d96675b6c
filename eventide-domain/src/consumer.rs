//! 事件反序列化管道（EventConsumer）
//!
//! 将不同传输形态的信封归一为扁平字段，再经注册表解析为类型化事件：
//! - 批量容器（`Records`）：逐条按来源处理，队列来源的消息体视为不透明文本；
//! - 包装信封（`detail-type` + `detail`）：解开 `detail` 后按扁平信封处理；
//! - 扁平信封：直接包含 `event_type` 与 `tenant_id`。
//!
//! 租户白名单在结构解析之前校验；严格模式下未知类型报错，宽松模式退化为无类型事件。
//!
use crate::error::{EventError, EventResult};
use crate::event::Event;
use crate::registry::EventRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// 批量容器中队列来源记录的 `eventSource` 取值
pub const QUEUE_EVENT_SOURCE: &str = "aws:sqs";

const RECORDS_FIELD: &str = "Records";
const DETAIL_FIELD: &str = "detail";
const DETAIL_TYPE_FIELD: &str = "detail-type";
const BODY_FIELD: &str = "body";
const EVENT_SOURCE_FIELD: &str = "eventSource";

/// 反序列化管道配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// 严格模式：未知类型直接报错
    pub strict_mode: bool,
    /// 租户白名单；为空表示不过滤
    pub allowed_tenant_ids: Option<HashSet<String>>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            allowed_tenant_ids: None,
        }
    }
}

impl ConsumerConfig {
    pub fn lenient() -> Self {
        Self {
            strict_mode: false,
            ..Self::default()
        }
    }

    pub fn with_allowed_tenants<I, T>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tenants: HashSet<String> = tenants.into_iter().map(Into::into).collect();
        self.allowed_tenant_ids = (!tenants.is_empty()).then_some(tenants);
        self
    }
}

/// 事件消费端的反序列化入口
pub struct EventConsumer {
    registry: Arc<EventRegistry>,
    config: ConsumerConfig,
}

impl EventConsumer {
    /// 使用进程级注册表
    pub fn new(config: ConsumerConfig) -> Self {
        Self::with_registry(EventRegistry::global(), config)
    }

    pub fn with_registry(registry: Arc<EventRegistry>, config: ConsumerConfig) -> Self {
        tracing::info!(
            strict_mode = config.strict_mode,
            tenant_filter_enabled = config.allowed_tenant_ids.is_some(),
            "event consumer initialized"
        );
        Self { registry, config }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// 自动识别信封形态并解析出全部事件
    ///
    /// 识别顺序：批量容器 → 包装信封 → 扁平信封，均不匹配时返回 `UnrecognizedSource`。
    pub fn from_envelope(&self, envelope: &Value) -> EventResult<Vec<Event>> {
        let Value::Object(fields) = envelope else {
            return Err(EventError::UnrecognizedSource);
        };

        if let Some(records) = fields.get(RECORDS_FIELD) {
            let Value::Array(records) = records else {
                return Err(EventError::invalid_event("'Records' must be an array"));
            };
            return self.from_records(records);
        }

        if is_wrapped(fields) {
            return self.from_wrapped(envelope).map(|ev| vec![ev]);
        }

        if fields.contains_key("event_type") {
            return self.from_map(fields).map(|ev| vec![ev]);
        }

        Err(EventError::UnrecognizedSource)
    }

    /// 解析包装信封：`detail` 可能是对象或 JSON 文本
    pub fn from_wrapped(&self, envelope: &Value) -> EventResult<Event> {
        let detail = envelope
            .get(DETAIL_FIELD)
            .ok_or_else(|| EventError::invalid_event("wrapped envelope missing 'detail' field"))?;

        let detail = parse_text_or_object(detail, "event detail")?;
        self.from_map(&detail)
    }

    /// 解析队列消息：消息体为不透明文本，解析后再检查是否为包装信封
    pub fn from_queue_message(&self, message: &Value) -> EventResult<Event> {
        let body = message
            .get(BODY_FIELD)
            .ok_or_else(|| EventError::invalid_event("queue message missing 'body' field"))?;

        let body = parse_text_or_object(body, "queue message body")?;
        if is_wrapped(&body) {
            return self.from_wrapped(&Value::Object(body));
        }

        self.from_map(&body)
    }

    /// 解析 JSON 文本形式的扁平信封
    pub fn from_json(&self, text: &str) -> EventResult<Event> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| EventError::malformed("json string", &err, text))?;
        let Value::Object(fields) = value else {
            return Err(EventError::invalid_event("event JSON must be an object"));
        };
        self.from_map(&fields)
    }

    /// 解析扁平信封
    pub fn from_map(&self, fields: &Map<String, Value>) -> EventResult<Event> {
        let event_type = fields.get("event_type").and_then(Value::as_str);
        let tenant_id = fields.get("tenant_id").and_then(Value::as_str);

        // 租户校验先于结构解析，未知或畸形类型同样受保护
        // 空白名单与未配置等价
        if let Some(allowed) = self.config.allowed_tenant_ids.as_ref().filter(|s| !s.is_empty()) {
            let permitted = tenant_id.is_some_and(|t| allowed.contains(t));
            if !permitted {
                tracing::warn!(
                    event_type = ?event_type,
                    tenant_id = ?tenant_id,
                    "event rejected: tenant not allowed"
                );
                return Err(EventError::TenantRejected {
                    tenant_id: tenant_id.unwrap_or_default().to_string(),
                    event_type: event_type.map(str::to_string),
                });
            }
        }

        match self.registry.deserialize(fields) {
            Ok(event) => {
                tracing::debug!(
                    event_id = %event.event_id(),
                    event_type = event.event_type(),
                    tenant_id = event.tenant_id(),
                    "event deserialized"
                );
                Ok(event)
            }
            Err(EventError::UnknownType { event_type }) if !self.config.strict_mode => {
                tracing::warn!(
                    event_type = %event_type,
                    tenant_id = ?tenant_id,
                    "unknown event type, falling back to untyped event"
                );
                Event::untyped(fields)
            }
            Err(err) => Err(err),
        }
    }

    fn from_records(&self, records: &[Value]) -> EventResult<Vec<Event>> {
        let mut events = Vec::with_capacity(records.len());

        for record in records {
            let origin = record
                .get(EVENT_SOURCE_FIELD)
                .and_then(Value::as_str)
                .unwrap_or_default();

            if origin == QUEUE_EVENT_SOURCE {
                events.push(self.from_queue_message(record)?);
                continue;
            }

            // 其他来源的记录：消息体即扁平数据；没有消息体的记录跳过
            match record.get(BODY_FIELD) {
                None | Some(Value::Null) => {
                    tracing::debug!(origin, "record without body skipped");
                }
                Some(body) => {
                    let body = parse_text_or_object(body, "record body")?;
                    events.push(self.from_map(&body)?);
                }
            }
        }

        Ok(events)
    }
}

fn is_wrapped(fields: &Map<String, Value>) -> bool {
    fields.contains_key(DETAIL_TYPE_FIELD) && fields.contains_key(DETAIL_FIELD)
}

fn parse_text_or_object(value: &Value, context: &str) -> EventResult<Map<String, Value>> {
    let parsed = match value {
        Value::String(text) => {
            serde_json::from_str(text).map_err(|err| EventError::malformed(context, &err, text))?
        }
        other => other.clone(),
    };

    match parsed {
        Value::Object(fields) => Ok(fields),
        _ => Err(EventError::invalid_event(format!("{context} must be a JSON object"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityCreated, register_core_events};
    use serde_json::json;
    use uuid::Uuid;

    fn consumer(config: ConsumerConfig) -> EventConsumer {
        let registry = Arc::new(EventRegistry::new());
        register_core_events(&registry).unwrap();
        EventConsumer::with_registry(registry, config)
    }

    fn created(tenant: &str) -> Value {
        json!({
            "event_type": "entity.created",
            "tenant_id": tenant,
            "entity_id": Uuid::new_v4(),
            "entity_type": "Article",
            "attributes": {"sku": "WDG-001"}
        })
    }

    #[test]
    fn flat_envelope_yields_typed_event() {
        let events = consumer(ConsumerConfig::default())
            .from_envelope(&created("t-1"))
            .unwrap();

        assert_eq!(events.len(), 1);
        let payload = events[0].payload_as::<EntityCreated>().unwrap();
        assert_eq!(payload.entity_type, "Article");
    }

    #[test]
    fn wrapped_envelope_accepts_text_detail() {
        let envelope = json!({
            "source": "mkg-kernel",
            "detail-type": "entity.created",
            "detail": created("t-1").to_string()
        });

        let events = consumer(ConsumerConfig::default())
            .from_envelope(&envelope)
            .unwrap();
        assert_eq!(events[0].event_type(), "entity.created");
    }

    #[test]
    fn malformed_detail_fails_in_both_modes() {
        let envelope = json!({"detail-type": "entity.created", "detail": "{not json"});

        for config in [ConsumerConfig::default(), ConsumerConfig::lenient()] {
            let err = consumer(config).from_envelope(&envelope).unwrap_err();
            assert!(matches!(err, EventError::MalformedEnvelope { .. }));
        }
    }

    #[test]
    fn queue_body_may_carry_wrapped_envelope() {
        let inner = json!({"detail-type": "entity.created", "detail": created("t-1")});
        let message = json!({"eventSource": "aws:sqs", "body": inner.to_string()});

        let ev = consumer(ConsumerConfig::default())
            .from_queue_message(&message)
            .unwrap();
        assert_eq!(ev.tenant_id(), "t-1");
    }

    #[test]
    fn unrecognized_shape_is_rejected() {
        let c = consumer(ConsumerConfig::default());
        assert!(matches!(
            c.from_envelope(&json!({"hello": "world"})),
            Err(EventError::UnrecognizedSource)
        ));
        assert!(matches!(
            c.from_envelope(&json!([1, 2])),
            Err(EventError::UnrecognizedSource)
        ));
    }

    #[test]
    fn tenant_filter_runs_before_type_resolution() {
        let c = consumer(ConsumerConfig::default().with_allowed_tenants(["t-1"]));

        let unknown = json!({"event_type": "nope", "tenant_id": "t-2", "source": "x"});
        assert!(matches!(
            c.from_envelope(&unknown),
            Err(EventError::TenantRejected { .. })
        ));

        let missing_tenant = json!({"event_type": "entity.created"});
        assert!(matches!(
            c.from_envelope(&missing_tenant),
            Err(EventError::TenantRejected { .. })
        ));
    }

    #[test]
    fn empty_tenant_allow_list_does_not_filter() {
        let from_config: ConsumerConfig =
            serde_json::from_value(json!({"allowed_tenant_ids": []})).unwrap();
        let explicit = ConsumerConfig {
            allowed_tenant_ids: Some(HashSet::new()),
            ..ConsumerConfig::default()
        };

        for config in [from_config, explicit] {
            let events = consumer(config).from_envelope(&created("t-1")).unwrap();
            assert_eq!(events[0].tenant_id(), "t-1");
        }
    }

    #[test]
    fn lenient_untyped_event_without_source_gets_default() {
        let ev = consumer(ConsumerConfig::lenient())
            .from_map(
                json!({"event_type": "billing.invoiced", "tenant_id": "t-1", "data": {"amount": 12}})
                    .as_object()
                    .unwrap(),
            )
            .unwrap();

        assert_eq!(ev.event_type(), "billing.invoiced");
        assert_eq!(ev.source(), crate::event::DEFAULT_SOURCE);
        assert!(ev.payload().is_none());
        assert_eq!(ev.data()["amount"], json!(12));
    }

    #[test]
    fn from_json_reports_malformed_text() {
        let err = consumer(ConsumerConfig::default())
            .from_json("{oops")
            .unwrap_err();
        assert!(matches!(err, EventError::MalformedEnvelope { .. }));
    }

    #[test]
    fn records_without_body_are_skipped() {
        let batch = json!({"Records": [
            {"eventSource": "custom"},
            {"eventSource": "custom", "body": created("t-1")}
        ]});

        let events = consumer(ConsumerConfig::default())
            .from_envelope(&batch)
            .unwrap();
        assert_eq!(events.len(), 1);
    }
}
