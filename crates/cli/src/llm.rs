use crate::config::LlmConfig;
use crate::service::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Produces an answer for a fully assembled prompt
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Prompt handed to the generator for a question and its retrieved context
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an AI assistant. Use the context below to answer the question accurately and concisely.\n\
         Context:\n\
         {context}\n\
         \n\
         Question: {question}\n"
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints
pub struct OpenAiChatGenerator {
    client: Client,
    endpoint: String,
    config: LlmConfig,
}

impl OpenAiChatGenerator {
    pub fn new(config: LlmConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        log::info!("Answer generation via {} ({})", endpoint, config.model);
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiChatGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Generation(format!("POST {} failed: {e}", self.endpoint)))?
            .error_for_status()
            .map_err(|e| ServiceError::Generation(format!("POST {} failed: {e}", self.endpoint)))?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Generation(format!("Malformed completion: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::Generation("Completion has no content".to_string()))
    }
}
