use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document ready for insertion.
#[derive(Debug, Clone)]
pub struct Document<'a> {
    pub id: &'a str,
    pub text: &'a str,
    pub embedding: &'a [f32],
}

/// Which model produced a document's embedding, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub created_timestamp: DateTime<Utc>,
}

impl ModelInfo {
    #[must_use]
    pub fn now(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_timestamp: Utc::now(),
        }
    }
}

/// A document as read back from the collection.
#[derive(Debug)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub model_info: Option<ModelInfo>,
}

/// One ranked vector search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    pub score: f64,
    pub text: String,
}
