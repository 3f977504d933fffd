//! Draws k candidate replies for one agent turn, through the response cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::cache::ResponseCache;
use crate::agent::Agent;
use crate::config::SearchConfig;
use crate::error::{GenerationError, InvariantViolation};
use crate::model::GenerationBackend;
use crate::training::metrics::RunMetrics;
use crate::trajectory::estimate_tokens;

/// Prefix marking a candidate whose generation call failed.
pub const GENERATION_ERROR_PREFIX: &str = "[generation error]";

pub fn generation_error_text(err: &GenerationError) -> String {
    format!("{GENERATION_ERROR_PREFIX} {err}")
}

pub fn is_generation_error(candidate: &str) -> bool {
    candidate.starts_with(GENERATION_ERROR_PREFIX)
}

/// Sampling parameters fixed for a run.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub temperature: f64,
    pub max_tokens: usize,
    /// Pause between the sequential calls of one batch.
    pub inter_call_delay: Duration,
    /// Most recent learned behaviors placed in the system prompt.
    pub prompt_behaviors: usize,
}

impl From<&SearchConfig> for SamplerSettings {
    fn from(c: &SearchConfig) -> Self {
        Self {
            temperature: c.temperature,
            max_tokens: c.max_tokens,
            inter_call_delay: Duration::from_millis(c.inter_call_delay_ms),
            prompt_behaviors: c.prompt_behaviors,
        }
    }
}

pub struct Sampler<B> {
    backend: B,
    cache: Arc<ResponseCache>,
    metrics: Arc<RunMetrics>,
    settings: SamplerSettings,
}

impl<B: GenerationBackend> Sampler<B> {
    pub fn new(
        backend: B,
        cache: Arc<ResponseCache>,
        metrics: Arc<RunMetrics>,
        settings: SamplerSettings,
    ) -> Self {
        Self {
            backend,
            cache,
            metrics,
            settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Return `k` candidate replies for `agent` given the conversation `context`.
    ///
    /// A failed call yields a [`GENERATION_ERROR_PREFIX`] sentinel in its slot
    /// instead of failing the batch. Only fully successful batches are cached.
    pub async fn sample(
        &self,
        agent: &Agent,
        context: &str,
        k: usize,
    ) -> Result<Vec<String>, InvariantViolation> {
        if k == 0 {
            return Err(InvariantViolation::new("sample count k must be at least 1"));
        }
        let s = &self.settings;
        let system = agent.system_prompt(s.prompt_behaviors);
        // The prompt snapshot is part of the key: a behavior update never
        // serves a batch produced under older instructions.
        let key_context = format!("{system}\n\n{context}");

        if let Some(hit) = self.cache.get(agent.id(), &key_context, s.temperature, k) {
            return Ok(hit);
        }

        let prompt_tokens = estimate_tokens(&system) + estimate_tokens(context);
        let mut responses = Vec::with_capacity(k);
        let mut failures = 0usize;
        for call in 0..k {
            if call > 0 && !s.inter_call_delay.is_zero() {
                tokio::time::sleep(s.inter_call_delay).await;
            }
            match self
                .backend
                .generate(&system, context, s.temperature, s.max_tokens)
                .await
            {
                Ok(text) => {
                    self.metrics.record_generation(true);
                    self.metrics.record_tokens(prompt_tokens + estimate_tokens(&text));
                    responses.push(text);
                }
                Err(e) => {
                    self.metrics.record_generation(false);
                    warn!(agent = agent.role(), call, error = %e, "generation call failed");
                    failures += 1;
                    responses.push(generation_error_text(&e));
                }
            }
        }

        if failures == 0 {
            self.cache
                .put(agent.id(), &key_context, s.temperature, k, responses.clone());
        } else {
            debug!(agent = agent.role(), failures, k, "degraded batch not cached");
        }
        Ok(responses)
    }
}
