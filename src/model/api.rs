//! OpenAI-compatible chat completions backend.
//!
//! Works against any server exposing `POST {base}/chat/completions` with
//! bearer authentication.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::backend::GenerationBackend;
use crate::error::GenerationError;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
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

/// A single completion choice returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Token usage statistics for a request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A chat completion response from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    /// The base URL for API requests (e.g. `"https://api.openai.com/v1"`).
    pub api_base: String,
    pub api_key: String,
    pub model_id: String,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub const DEFAULT_BASE: &'static str = "https://api.openai.com/v1";

    pub fn new(base_url: &str, api_key: &str, model_id: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            api_base: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_id: model_id.to_string(),
            http,
        })
    }

    /// Send a chat completion request and return the parsed response.
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: usize,
    ) -> Result<ChatResponse, GenerationError> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(model = %self.model_id, temperature, max_tokens, "sending chat completion request");

        let body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let chat_response: ChatResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("invalid response body: {e}")))?;

        info!(
            model = %self.model_id,
            prompt_tokens = chat_response.usage.prompt_tokens,
            completion_tokens = chat_response.usage.completion_tokens,
            "chat completion succeeded"
        );

        Ok(chat_response)
    }
}

impl GenerationBackend for OpenAiBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        context: &str,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String, GenerationError> {
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(context)];
        let resp = self.chat_completion(&messages, temperature, max_tokens).await?;
        first_choice_text(&resp).ok_or(GenerationError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Text of the first non-empty choice.
fn first_choice_text(response: &ChatResponse) -> Option<String> {
    response
        .choices
        .first()
        .map(|c| c.message.content.trim().to_string())
        .filter(|s| !s.is_empty())
}
