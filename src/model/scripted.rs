//! Deterministic backend for tests and offline (`--mock`) runs.
//!
//! Responses are served round-robin by call number. Individual call numbers
//! can be made to fail, and every call is logged for later inspection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::backend::GenerationBackend;
use crate::error::GenerationError;

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCall {
    pub system_prompt: String,
    pub context: String,
    pub temperature: f64,
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Vec<String>,
    fail_on: HashSet<usize>,
    fail_all: bool,
    latency: Option<Duration>,
    calls: AtomicUsize,
    log: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedBackend {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Canned collaborative replies used by `--mock` runs.
    pub fn demo() -> Self {
        Self::new([
            "Here is a first draft: split the work into ingestion, processing and reporting stages, each owned by one module.",
            "Building on that draft, the processing stage needs a bounded queue so ingestion cannot outrun it.",
            "Agreed. I would add retries with backoff around ingestion, and make reporting idempotent.",
            "Combining the stages, the queue bound and the idempotent reporting gives a complete design. FINAL ANSWER",
            "One concern: the draft does not say how failures in processing are surfaced to reporting.",
        ])
    }

    /// Fail the given zero-based call numbers with [`GenerationError::Scripted`].
    pub fn with_failures(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_on.extend(calls);
        self
    }

    /// Fail every call.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        context: &str,
        temperature: f64,
        _max_tokens: usize,
    ) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(ScriptedCall {
                system_prompt: system_prompt.to_string(),
                context: context.to_string(),
                temperature,
            });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_all || self.fail_on.contains(&n) {
            return Err(GenerationError::Scripted(n));
        }
        if self.responses.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(self.responses[n % self.responses.len()].clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_robin_responses() {
        let backend = ScriptedBackend::new(["a", "b"]);
        let mut out = Vec::new();
        for _ in 0..3 {
            out.push(backend.generate("s", "c", 0.5, 10).await.unwrap());
        }
        assert_eq!(out, vec!["a", "b", "a"]);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = ScriptedBackend::new(["a"]).with_failures([1]);
        assert!(backend.generate("s", "c", 0.5, 10).await.is_ok());
        assert_eq!(
            backend.generate("s", "c", 0.5, 10).await,
            Err(GenerationError::Scripted(1))
        );
        assert!(backend.generate("s", "c", 0.5, 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_call_log_records_inputs() {
        let backend = ScriptedBackend::new(["a"]);
        backend.generate("system", "context", 0.3, 10).await.unwrap();
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system_prompt, "system");
        assert_eq!(calls[0].context, "context");
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let backend = ScriptedBackend::failing();
        assert!(backend.generate("s", "c", 0.5, 10).await.is_err());
    }
}
