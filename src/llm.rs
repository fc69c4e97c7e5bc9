//! Chat-completion client.
//!
//! [`ChatModel`] is the seam the answer pipeline talks to. [`GroqChatModel`]
//! calls Groq's OpenAI-compatible `POST {base_url}/chat/completions`.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{Config, LlmConfig};
use crate::error::ProviderError;
use crate::retry::{http_client, json_body, send_with_retry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the assistant's reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

pub struct GroqChatModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
    max_tokens: u32,
    max_retries: u32,
}

const PROVIDER: &str = "groq";

impl GroqChatModel {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(PROVIDER, config.timeout_secs)?,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for GroqChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });

        let response = send_with_retry(PROVIDER, self.max_retries, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        let json = json_body(PROVIDER, response).await?;

        let answer = parse_completion(&json)?;
        tracing::debug!(
            model = %self.model,
            total_tokens = json["usage"]["total_tokens"].as_u64().unwrap_or(0),
            "chat completion"
        );
        Ok(answer)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String, ProviderError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::bad_response(PROVIDER, "missing choices[0].message.content"))
}

/// Create the chat model named by `llm.provider`.
pub fn create_chat_model(config: &Config) -> anyhow::Result<Arc<dyn ChatModel>> {
    match config.llm.provider.as_str() {
        "groq" => Ok(Arc::new(GroqChatModel::new(
            &config.llm,
            config.groq_api_key()?,
        )?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}
