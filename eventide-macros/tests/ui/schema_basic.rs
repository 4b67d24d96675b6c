use eventide_domain::event::EventSchema;
use eventide_macros::event_schema;

#[event_schema(event_type = "article.published", source = "cms")]
pub struct ArticlePublished {
    pub article_id: uuid::Uuid,
    #[schema(non_empty)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn main() {
    assert_eq!(ArticlePublished::EVENT_TYPE, "article.published");
    assert_eq!(ArticlePublished::SOURCE, "cms");

    let parsed: ArticlePublished = serde_json::from_value(serde_json::json!({
        "article_id": uuid::Uuid::new_v4(),
        "title": ""
    }))
    .unwrap();
    assert!(parsed.tags.is_empty());
    assert_eq!(parsed.validate(), Err("title must not be empty".to_string()));

    let unknown = serde_json::from_value::<ArticlePublished>(serde_json::json!({
        "article_id": uuid::Uuid::new_v4(),
        "title": "Hello",
        "extra": 1
    }));
    assert!(unknown.is_err());
}
