//! 事件校验器（EventValidator）
//!
//! 在反序列化之外提供面向运维/接入的校验：来源、类型、租户白名单，
//! 关联 ID 必填，以及调用方自定义的字段规则。结果汇总为 `ValidationReport`，
//! 不以错误中断。
//!
use crate::event::Event;
use crate::registry::EventRegistry;
use bon::bon;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// 自定义校验规则，返回的每一项都是一条错误信息
pub trait FieldRule: Send + Sync {
    fn check(&self, data: &Map<String, Value>) -> anyhow::Result<Vec<String>>;
}

impl<F> FieldRule for F
where
    F: Fn(&Map<String, Value>) -> anyhow::Result<Vec<String>> + Send + Sync,
{
    fn check(&self, data: &Map<String, Value>) -> anyhow::Result<Vec<String>> {
        self(data)
    }
}

/// 单字段规则：字段存在且谓词不成立时报告 `message`
pub fn field_rule<P>(field: impl Into<String>, predicate: P, message: impl Into<String>) -> Arc<dyn FieldRule>
where
    P: Fn(&Value) -> bool + Send + Sync + 'static,
{
    let field = field.into();
    let message = message.into();
    Arc::new(move |data: &Map<String, Value>| -> anyhow::Result<Vec<String>> {
        Ok(match data.get(&field) {
            Some(value) if !predicate(value) => vec![message.clone()],
            _ => Vec::new(),
        })
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub event_type: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn finish(event_type: Option<String>, errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            event_type,
            errors,
            warnings,
        }
    }
}

pub struct EventValidator {
    registry: Arc<EventRegistry>,
    require_correlation_id: bool,
    allowed_sources: Option<BTreeSet<String>>,
    allowed_event_types: Option<BTreeSet<String>>,
    allowed_tenant_ids: Option<HashSet<String>>,
    custom_rules: Vec<Arc<dyn FieldRule>>,
}

#[bon]
impl EventValidator {
    #[builder]
    pub fn new(
        #[builder(default = EventRegistry::global())] registry: Arc<EventRegistry>,
        #[builder(default)] require_correlation_id: bool,
        allowed_sources: Option<BTreeSet<String>>,
        allowed_event_types: Option<BTreeSet<String>>,
        allowed_tenant_ids: Option<HashSet<String>>,
        #[builder(default)] custom_rules: Vec<Arc<dyn FieldRule>>,
    ) -> Self {
        // 空集合视为不过滤
        let allowed_sources = allowed_sources.filter(|s| !s.is_empty());
        let allowed_event_types = allowed_event_types.filter(|s| !s.is_empty());
        let allowed_tenant_ids = allowed_tenant_ids.filter(|s| !s.is_empty());

        tracing::info!(
            require_correlation_id,
            source_filter_enabled = allowed_sources.is_some(),
            event_type_filter_enabled = allowed_event_types.is_some(),
            tenant_filter_enabled = allowed_tenant_ids.is_some(),
            custom_rule_count = custom_rules.len(),
            "event validator initialized"
        );

        Self {
            registry,
            require_correlation_id,
            allowed_sources,
            allowed_event_types,
            allowed_tenant_ids,
            custom_rules,
        }
    }
}

impl EventValidator {
    /// 校验扁平信封
    pub fn validate(&self, data: &Map<String, Value>) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let Some(event_type) = non_empty_str(data, "event_type") else {
            errors.push("missing required field: event_type".to_string());
            return ValidationReport::finish(None, errors, Vec::new());
        };

        let parser = self.registry.get(event_type);
        if parser.is_none() {
            warnings.push(format!("event type '{event_type}' is not registered"));
        }

        if let Some(allowed) = &self.allowed_event_types {
            if !allowed.contains(event_type) {
                errors.push(format!(
                    "event type '{event_type}' not in allowed types: {allowed:?}"
                ));
            }
        }

        match non_empty_str(data, "tenant_id") {
            None => errors.push("missing required field: tenant_id".to_string()),
            Some(tenant) => {
                if let Some(allowed) = &self.allowed_tenant_ids {
                    if !allowed.contains(tenant) {
                        errors.push(format!("tenant '{tenant}' not in allowed tenants"));
                    }
                }
            }
        }

        match non_empty_str(data, "source") {
            None => errors.push("missing required field: source".to_string()),
            Some(source) => {
                if let Some(allowed) = &self.allowed_sources {
                    if !allowed.contains(source) {
                        errors.push(format!(
                            "source '{source}' not in allowed sources: {allowed:?}"
                        ));
                    }
                }
            }
        }

        if self.require_correlation_id {
            let present = data
                .get("metadata")
                .and_then(|m| m.get("correlation_id"))
                .and_then(Value::as_str)
                .is_some_and(|c| !c.is_empty());
            if !present {
                errors.push("missing required field: metadata.correlation_id".to_string());
            }
        }

        // 前置检查全部通过后才做结构解析
        if let Some(parser) = parser {
            if errors.is_empty() {
                if let Err(err) = parser.parse(data) {
                    errors.push(format!("schema validation error: {err}"));
                }
            }
        }

        for rule in &self.custom_rules {
            match rule.check(data) {
                Ok(found) => errors.extend(found),
                Err(err) => errors.push(format!("custom validator error: {err}")),
            }
        }

        if !errors.is_empty() {
            tracing::warn!(
                event_type,
                error_count = errors.len(),
                errors = ?&errors[..errors.len().min(5)],
                "event validation failed"
            );
        } else if !warnings.is_empty() {
            tracing::debug!(
                event_type,
                warning_count = warnings.len(),
                "event validation warnings"
            );
        }

        ValidationReport::finish(Some(event_type.to_string()), errors, warnings)
    }

    /// 校验已解析的事件（不重复结构校验）
    pub fn validate_event(&self, event: &Event) -> ValidationReport {
        let mut errors = Vec::new();

        if let Some(allowed) = &self.allowed_event_types {
            if !allowed.contains(event.event_type()) {
                errors.push(format!(
                    "event type '{}' not in allowed types",
                    event.event_type()
                ));
            }
        }
        if let Some(allowed) = &self.allowed_tenant_ids {
            if !allowed.contains(event.tenant_id()) {
                errors.push(format!("tenant '{}' not in allowed tenants", event.tenant_id()));
            }
        }
        if let Some(allowed) = &self.allowed_sources {
            if !allowed.contains(event.source()) {
                errors.push(format!("source '{}' not in allowed sources", event.source()));
            }
        }
        if self.require_correlation_id && event.correlation_id().is_none_or(str::is_empty) {
            errors.push("missing required field: metadata.correlation_id".to_string());
        }

        ValidationReport::finish(Some(event.event_type().to_string()), errors, Vec::new())
    }

    pub fn is_registered_type(&self, event_type: &str) -> bool {
        self.registry.contains(event_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.registry.list_types()
    }
}

fn non_empty_str<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
