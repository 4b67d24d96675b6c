use bon::Builder;
use serde::{Deserialize, Serialize};

/// 事件元数据：链路追踪与审计信息，全部可选，设置后不可变
#[derive(Builder, Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventMetadata {
    /// 关联ID（跨服务请求追踪）
    #[builder(into)]
    correlation_id: Option<String>,
    /// 因果ID（触发本事件的上游事件）
    #[builder(into)]
    causation_id: Option<String>,
    /// 触发事件的用户ID
    #[builder(into)]
    user_id: Option<String>,
    /// 原始 API 请求ID
    #[builder(into)]
    request_id: Option<String>,
}

impl EventMetadata {
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}
