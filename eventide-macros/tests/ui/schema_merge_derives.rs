use eventide_domain::event::{Event, EventSchema};
use eventide_macros::event_schema;

// 已有的派生与宏追加的派生合并，不重复
#[event_schema(event_type = "stock.adjusted")]
#[derive(Debug, Clone, Default)]
pub struct StockAdjusted {
    pub sku: String,
    pub delta: i64,
}

fn main() {
    assert_eq!(StockAdjusted::SOURCE, "unknown");

    let payload = StockAdjusted {
        sku: "WDG-001".into(),
        delta: -3,
    };
    let event = Event::from_payload("t-1", payload.clone()).unwrap();
    assert_eq!(event.event_type(), "stock.adjusted");
    assert_eq!(event.payload_as::<StockAdjusted>(), Some(&payload));
    assert_eq!(event.data().get("delta"), Some(&serde_json::json!(-3)));
}
