//! Remote representation of a post.
//!
//! Every document wraps the whole post under a single `post` field. Decoding
//! is tolerant: a missing or mistyped field falls back to its empty value, and
//! only a document without any `post` object is skipped.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{Category, Post};

pub const POST_FIELD: &str = "post";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentList {
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl Document {
    pub fn from_post(post: &Post) -> Self {
        Self {
            id: post.id().to_string(),
            fields: json!({ POST_FIELD: post }),
        }
    }

    pub fn decode(&self) -> Option<Post> {
        let fields = self.fields.get(POST_FIELD)?.as_object()?;

        let id = match text(fields, "id") {
            id if id.is_empty() => self.id.clone(),
            id => id,
        };
        let category = fields
            .get("category")
            .and_then(Value::as_str)
            .map(Category::from_name)
            .unwrap_or_default();

        let (ratings, user_rate) = ratings(fields);

        let post = Post::new(id, text(fields, "title"), text(fields, "description"))
            .photo(optional_text(fields, "photo"))
            .address(optional_text(fields, "address"))
            .location(float(fields, "lat"), float(fields, "lon"))
            .lifespan(integer(fields, "lifespan"))
            .category(category)
            .with_engagement(
                texts(fields, "userUp"),
                texts(fields, "userDown"),
                ratings,
                user_rate,
                texts(fields, "comments"),
            );
        Some(post)
    }
}

/// Decode every document, skipping those that carry no post.
pub fn decode_all(documents: &[Document]) -> Vec<Post> {
    documents.iter().filter_map(Document::decode).collect()
}

fn text(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn float(fields: &Map<String, Value>, key: &str) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or_default()
}

fn integer(fields: &Map<String, Value>, key: &str) -> u32 {
    fields
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v.min(u32::MAX as u64) as u32)
        .unwrap_or_default()
}

fn texts(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    fields
        .get(key)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ratings and raters are parallel lists, an entry is kept only when both halves decode
fn ratings(fields: &Map<String, Value>) -> (Vec<u8>, Vec<String>) {
    let empty = vec![];
    let ratings = fields
        .get("ratings")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let raters = fields
        .get("userRate")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    ratings
        .iter()
        .zip(raters)
        .filter_map(|(rating, rater)| {
            let rating = rating.as_u64().filter(|r| (1..=5).contains(r))? as u8;
            let rater = rater.as_str()?.to_string();
            Some((rating, rater))
        })
        .unzip()
}
