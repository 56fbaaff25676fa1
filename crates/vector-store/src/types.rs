use serde::{Deserialize, Serialize};

/// Opaque key/value metadata attached to every stored vector
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A vector together with the text it was computed from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedEntry {
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
}

/// What to search for: raw text (embedded by the store's embedder) or a ready vector
#[derive(Debug, Clone, Copy)]
pub enum SearchQuery<'a> {
    Text(&'a str),
    Vector(&'a [f32]),
}

impl<'a> From<&'a str> for SearchQuery<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a [f32]> for SearchQuery<'a> {
    fn from(vector: &'a [f32]) -> Self {
        Self::Vector(vector)
    }
}

impl<'a> From<&'a Vec<f32>> for SearchQuery<'a> {
    fn from(vector: &'a Vec<f32>) -> Self {
        Self::Vector(vector.as_slice())
    }
}
