//! Error taxonomy for the search and credit-assignment engine.
//!
//! Per-call failures ([`GenerationError`], [`EvaluationError`]) are contained
//! where they happen and turned into degraded data. Structural failures
//! ([`InvariantViolation`]) always reach the caller of the trainer.

use thiserror::Error;

/// A single sampling call against the generation service failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response contained no text")]
    EmptyResponse,

    #[error("scripted failure on call {0}")]
    Scripted(usize),
}

/// The judge or task scorer could not produce a reward.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("task scorer failed: {0}")]
    Scorer(String),

    #[error("judge call failed: {0}")]
    Judge(#[from] GenerationError),

    #[error("could not parse judge response: {0}")]
    Parse(String),
}

/// A programming error: the engine was driven into a state it never allows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invariant violated: {0}")]
pub struct InvariantViolation(pub String);

impl InvariantViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by the trainer to its caller.
#[derive(Error, Debug)]
pub enum TrainerError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    /// The episode was abandoned; nothing from it was persisted.
    #[error("episode {episode} aborted: {reason}")]
    EpisodeAborted { episode: usize, reason: String },

    /// The winner was selected but could not be written. In-memory state
    /// keeps the episode, flagged as unsaved.
    #[error("failed to persist episode {episode}")]
    Persistence {
        episode: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The estimated token spend passed `run.max_budget_tokens`.
    #[error("token budget exhausted after episode {episode}: {spent} > {limit}")]
    BudgetExhausted { episode: usize, spent: u64, limit: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_display() {
        let err = GenerationError::Api {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "API returned 429: rate limited");
    }

    #[test]
    fn test_evaluation_error_from_generation() {
        let err: EvaluationError = GenerationError::EmptyResponse.into();
        assert!(matches!(err, EvaluationError::Judge(_)));
        assert!(err.to_string().contains("no text"));
    }

    #[test]
    fn test_invariant_converts_into_trainer_error() {
        let err: TrainerError = InvariantViolation::new("turn index gap").into();
        assert!(matches!(err, TrainerError::Invariant(_)));
        assert_eq!(err.to_string(), "invariant violated: turn index gap");
    }
}
