//! The generation capability and its provider dispatch.

use anyhow::Result;
use tracing::info;

use super::anthropic::AnthropicBackend;
use super::api::OpenAiBackend;
use super::scripted::ScriptedBackend;
use crate::config::{ModelConfig, Provider};
use crate::error::GenerationError;

/// One chat-style completion: system prompt plus a single user message.
///
/// Implementations wrap one provider's wire format. Retries, if any, belong
/// here rather than in the search loop.
#[allow(async_fn_in_trait)]
pub trait GenerationBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        context: &str,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String, GenerationError>;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Short label for logs.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// AnyBackend: enum dispatch over providers
// ---------------------------------------------------------------------------

/// Provider chosen at construction time, without `dyn` (async trait methods
/// are not object safe).
#[derive(Debug)]
pub enum AnyBackend {
    OpenAi(OpenAiBackend),
    Anthropic(AnthropicBackend),
    Scripted(ScriptedBackend),
}

impl AnyBackend {
    /// Build the backend for `model_id` from the configured provider.
    pub fn from_config(config: &ModelConfig, model_id: &str) -> Result<Self> {
        let backend = match config.provider {
            Provider::OpenAi => Self::OpenAi(OpenAiBackend::new(
                config.api_base.as_deref().unwrap_or(OpenAiBackend::DEFAULT_BASE),
                &config.api_key,
                model_id,
            )?),
            Provider::Anthropic => Self::Anthropic(AnthropicBackend::new(
                config.api_base.as_deref().unwrap_or(AnthropicBackend::DEFAULT_BASE),
                &config.api_key,
                model_id,
            )?),
            Provider::Mock => Self::Scripted(ScriptedBackend::demo()),
        };
        info!(backend = backend.name(), model_id, "generation backend ready");
        Ok(backend)
    }
}

impl GenerationBackend for AnyBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        context: &str,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String, GenerationError> {
        match self {
            Self::OpenAi(b) => b.generate(system_prompt, context, temperature, max_tokens).await,
            Self::Anthropic(b) => {
                b.generate(system_prompt, context, temperature, max_tokens).await
            }
            Self::Scripted(b) => {
                b.generate(system_prompt, context, temperature, max_tokens).await
            }
        }
    }

    fn supports_streaming(&self) -> bool {
        match self {
            Self::OpenAi(b) => b.supports_streaming(),
            Self::Anthropic(b) => b.supports_streaming(),
            Self::Scripted(b) => b.supports_streaming(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::OpenAi(b) => b.name(),
            Self::Anthropic(b) => b.name(),
            Self::Scripted(b) => b.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_builds_scripted_backend() {
        let config = ModelConfig::default();
        let backend = AnyBackend::from_config(&config, "any").unwrap();
        assert!(matches!(backend, AnyBackend::Scripted(_)));
        assert!(!backend.supports_streaming());
        let text = backend.generate("sys", "ctx", 0.7, 64).await.unwrap();
        assert!(!text.is_empty());
    }

    #[test]
    fn test_openai_provider_uses_default_base() {
        let config = ModelConfig {
            provider: Provider::OpenAi,
            ..ModelConfig::default()
        };
        match AnyBackend::from_config(&config, "gpt-4o-mini").unwrap() {
            AnyBackend::OpenAi(b) => assert_eq!(b.api_base, OpenAiBackend::DEFAULT_BASE),
            other => panic!("unexpected backend {other:?}"),
        }
    }
}
