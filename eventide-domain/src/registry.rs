//! 事件类型注册表（EventRegistry）
//!
//! 维护事件类型标签到解析器的映射：
//! - 重复注册视为错误，尽早暴露重复初始化；
//! - 查询未注册的标签返回 `None`，从不报错；
//! - 进程级实例通过 `EventRegistry::global()` 显式获取，并由
//!   `register_core_events` 显式初始化；测试可使用独立实例或 `clear`。
//!
use crate::error::{EventError, EventResult};
use crate::event::{Event, EventSchema};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

/// 将扁平信封解析为某一类型的事件
pub trait EventParser: Send + Sync {
    fn parse(&self, fields: &Map<String, Value>) -> EventResult<Event>;
}

impl<F> EventParser for F
where
    F: Fn(&Map<String, Value>) -> EventResult<Event> + Send + Sync,
{
    fn parse(&self, fields: &Map<String, Value>) -> EventResult<Event> {
        self(fields)
    }
}

/// 基于 `EventSchema` 的解析器
pub struct SchemaParser<S> {
    _schema: PhantomData<fn() -> S>,
}

impl<S> SchemaParser<S> {
    pub fn new() -> Self {
        Self {
            _schema: PhantomData,
        }
    }
}

impl<S> Default for SchemaParser<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> EventParser for SchemaParser<S>
where
    S: EventSchema,
{
    fn parse(&self, fields: &Map<String, Value>) -> EventResult<Event> {
        Event::from_schema_fields::<S>(fields)
    }
}

/// 事件类型注册表
#[derive(Default)]
pub struct EventRegistry {
    parsers: DashMap<String, Arc<dyn EventParser>>,
}

static GLOBAL: OnceLock<Arc<EventRegistry>> = OnceLock::new();

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级注册表（首次访问时创建，内容需显式注册）
    pub fn global() -> Arc<EventRegistry> {
        GLOBAL.get_or_init(|| Arc::new(EventRegistry::new())).clone()
    }

    /// 注册解析器；标签已存在时返回 `DuplicateType`
    pub fn register(
        &self,
        event_type: impl Into<String>,
        parser: Arc<dyn EventParser>,
    ) -> EventResult<()> {
        match self.parsers.entry(event_type.into()) {
            Entry::Occupied(entry) => Err(EventError::DuplicateType {
                event_type: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                tracing::debug!(event_type = %entry.key(), "event type registered");
                entry.insert(parser);
                Ok(())
            }
        }
    }

    /// 以结构自身的类型标签注册
    pub fn register_schema<S>(&self) -> EventResult<()>
    where
        S: EventSchema,
    {
        self.register(S::EVENT_TYPE, Arc::new(SchemaParser::<S>::new()))
    }

    /// 注销；不存在时忽略
    pub fn unregister(&self, event_type: &str) {
        self.parsers.remove(event_type);
    }

    pub fn get(&self, event_type: &str) -> Option<Arc<dyn EventParser>> {
        self.parsers.get(event_type).map(|p| p.value().clone())
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.parsers.contains_key(event_type)
    }

    /// 根据 `event_type` 字段解析为对应类型的事件
    pub fn deserialize(&self, fields: &Map<String, Value>) -> EventResult<Event> {
        let event_type = match fields.get("event_type") {
            Some(Value::String(t)) if !t.is_empty() => t,
            _ => {
                return Err(EventError::invalid_event(
                    "event data must contain 'event_type' field",
                ));
            }
        };

        // 先释放 DashMap 的读锁再解析，解析器内部可再次访问注册表
        let Some(parser) = self.get(event_type) else {
            return Err(EventError::UnknownType {
                event_type: event_type.clone(),
            });
        };

        parser.parse(fields)
    }

    /// 已注册的类型标签（有序）
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.parsers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// 清空全部注册（主要用于测试）
    pub fn clear(&self) {
        self.parsers.clear();
    }
}
