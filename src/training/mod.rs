//! Training module: the episode loop and the arithmetic behind it.
//!
//! - [`trainer`] -- beam search, evaluation, selection, persistence and
//!   periodic behavior updates.
//! - [`value`] -- reward estimation by task heuristic or LLM judge.
//! - [`advantage`] -- group-relative advantages and winner selection.
//! - [`metrics`] and [`summary`] -- run counters and end-of-run statistics.

pub mod advantage;
pub mod metrics;
pub mod summary;
pub mod trainer;
pub mod value;

pub use advantage::{argmax, compute_advantages, select_index, softmax_weights};
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use summary::TrainingSummary;
pub use trainer::{Backends, Trainer};
pub use value::{credit_assignment, parse_judge_scores, ValueEstimator};
