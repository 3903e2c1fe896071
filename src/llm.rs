//! Chat model abstraction and implementations.
//!
//! Defines the [`ChatModel`] trait and two backends:
//! - **[`GroqClient`]** — calls the Groq OpenAI-compatible chat completions
//!   API. Construction fails when `GROQ_API_KEY` is absent, so a
//!   misconfigured deployment fails at startup rather than per request.
//! - **[`EchoModel`]** — deterministic offline model for development and
//!   tests: echoes the latest user message, marking whether a system prompt
//!   (grounding context) was present.
//!
//! Exactly one completion call is made per invocation; there is no tool
//! loop and no application-level retry beyond what the HTTP client does.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::LlmConfig;

/// One message in a chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for chat completion backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Run one completion over the message sequence and return the model's
    /// text verbatim.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "groq" => Ok(Box::new(GroqClient::new(config)?)),
        "echo" => Ok(Box::new(EchoModel)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Groq client ============

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

pub struct GroqClient {
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl GroqClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY").map_err(|_| {
            anyhow::anyhow!(
                "API key for Groq is missing. Please set the GROQ_API_KEY environment variable."
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[async_trait]
impl ChatModel for GroqClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "top_p": 1.0,
            "stream": false,
        });

        let response = self
            .client
            .post(GROQ_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Groq API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid Groq response: missing message content"))?;

        Ok(content.trim().to_string())
    }
}

// ============ Echo model ============

/// Deterministic offline model.
///
/// Replies with the latest user message, prefixed with `(grounded)` when a
/// system prompt is present, so callers can tell grounded from ungrounded
/// turns in tests without a network dependency.
pub struct EchoModel;

#[async_trait]
impl ChatModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let grounded = messages.iter().any(|m| m.role == "system");

        if grounded {
            Ok(format!("(grounded) {}", last_user))
        } else {
            Ok(format!("(ungrounded) {}", last_user))
        }
    }
}
