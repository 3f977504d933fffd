//! Persistence layer: where episode winners, checkpoints and run summaries go.
//!
//! - [`store::RunStore`] -- the trait the trainer writes through.
//! - [`json::JsonRunStore`] -- timestamped run directory of JSON and CSV files.
//! - [`memory::MemoryRunStore`] -- in-memory store for tests and dry runs.

pub mod json;
pub mod memory;
pub mod store;

pub use json::JsonRunStore;
pub use memory::MemoryRunStore;
pub use store::{AgentSnapshot, CheckpointRecord, EpisodeMetadata, EpisodeRecord, RunStore};
