//! eventide 过程宏
//!
//! - `#[event_schema(event_type = "...", source = "...")]`：为载荷结构体派生序列化能力
//!   并实现 `eventide_domain::event::EventSchema`。
//!
use proc_macro::TokenStream;

mod attrs;
mod event_schema;

/// 事件载荷宏
/// - 参数：`event_type`（必填）、`source`（默认 `"unknown"`）
/// - 字段可标注 `#[schema(non_empty)]`，解析后校验字段非空
///
/// ```ignore
/// #[event_schema(event_type = "entity.deleted", source = "mkg-kernel")]
/// pub struct EntityDeleted {
///     pub entity_id: uuid::Uuid,
///     #[schema(non_empty)]
///     pub entity_type: String,
/// }
/// ```
#[proc_macro_attribute]
pub fn event_schema(attr: TokenStream, item: TokenStream) -> TokenStream {
    event_schema::expand(attr, item)
}
