use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const API_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_TOP_K: usize = 4;

const fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Metadata attached to each retrieved chunk (`filename`, `chunk_index`, ...)
pub type SourceMetadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Success,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct UploadResponse {
    pub status: UploadStatus,
    pub filename: String,
    pub chunks_added: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Base64 image whose OCR text would be appended to the prompt
    #[serde(default)]
    pub image_base64: Option<String>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: DEFAULT_TOP_K,
            image_base64: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct QueryResponse {
    pub question: String,
    /// Retrieved chunk texts joined by blank lines
    pub context: String,
    /// `None` when no answer generator is configured
    pub answer: Option<String>,
    pub sources: Vec<SourceMetadata>,
    pub scores: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub embedder: String,
    pub dim: usize,
    pub search_mode: String,
    pub entries: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub hint: Option<String>,
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

/// JSON Schemas of every request and response body, keyed by type name
pub fn api_schemas() -> Result<serde_json::Value> {
    Ok(serde_json::json!({
        "schema_version": API_SCHEMA_VERSION,
        "UploadResponse": serde_json::to_value(schemars::schema_for!(UploadResponse))?,
        "QueryRequest": serde_json::to_value(schemars::schema_for!(QueryRequest))?,
        "QueryResponse": serde_json::to_value(schemars::schema_for!(QueryResponse))?,
        "HealthResponse": serde_json::to_value(schemars::schema_for!(HealthResponse))?,
        "ErrorEnvelope": serde_json::to_value(schemars::schema_for!(ErrorEnvelope))?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_request_defaults_top_k() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"question":"what is rust?"}"#).unwrap();
        assert_eq!(request, QueryRequest::new("what is rust?"));
    }

    #[test]
    fn upload_status_is_snake_case() {
        let response = UploadResponse {
            status: UploadStatus::Success,
            filename: "notes.txt".to_string(),
            chunks_added: 3,
        };
        assert_eq!(
            serialize_json(&response).unwrap(),
            r#"{"status":"success","filename":"notes.txt","chunks_added":3}"#
        );
    }

    #[test]
    fn schemas_cover_every_body() {
        let schemas = api_schemas().unwrap();
        for name in [
            "UploadResponse",
            "QueryRequest",
            "QueryResponse",
            "HealthResponse",
            "ErrorEnvelope",
        ] {
            assert!(schemas.get(name).is_some(), "missing schema for {name}");
        }
        assert_eq!(schemas["schema_version"], API_SCHEMA_VERSION);
    }
}
