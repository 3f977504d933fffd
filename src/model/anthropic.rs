//! Anthropic Messages API backend.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use super::backend::GenerationBackend;
use crate::error::GenerationError;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MessagesUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: MessagesUsage,
}

impl MessagesResponse {
    /// Concatenated text blocks.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// HTTP client for `POST {base}/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    pub api_base: String,
    pub api_key: String,
    pub model_id: String,
    http: reqwest::Client,
}

impl AnthropicBackend {
    pub const DEFAULT_BASE: &'static str = "https://api.anthropic.com/v1";

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
}

impl GenerationBackend for AnthropicBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        context: &str,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/messages", self.api_base);
        debug!(model = %self.model_id, temperature, max_tokens, "sending messages request");

        let body = serde_json::json!({
            "model": self.model_id,
            "system": system_prompt,
            "messages": [{"role": "user", "content": context}],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("invalid response body: {e}")))?;

        info!(
            model = %self.model_id,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "messages request succeeded"
        );

        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_joins_text_blocks_only() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "t1"},
                {"type": "text", "text": "world"}
            ],
            "usage": {"input_tokens": 5, "output_tokens": 2}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.text(), "Hello world");
    }
}
