//! The persistence boundary and the records that cross it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentPromptState;
use crate::behavior::BehaviorLibrary;
use crate::trajectory::{Reward, Trajectory};
use crate::training::TrainingSummary;

/// How the winner of an episode was chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub task_description: String,
    /// Finished candidates that reached evaluation.
    pub candidates: usize,
    pub candidate_rewards: Vec<f64>,
    pub advantages: Vec<f64>,
    pub selected_index: usize,
    /// Per-agent equal share of the winner's total, by agent id.
    pub credit: Vec<(usize, f64)>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// One persisted episode: the winner, its reward and selection metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// One-based episode number.
    pub episode: usize,
    pub trajectory: Trajectory,
    pub reward: Reward,
    pub metadata: EpisodeMetadata,
    /// False when the store rejected the write.
    #[serde(default)]
    pub saved: bool,
}

/// One agent's prompt state at checkpoint time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: usize,
    pub role: String,
    pub prompt: AgentPromptState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub episode: usize,
    pub agents: Vec<AgentSnapshot>,
    /// Winner totals of the last ten episodes.
    pub recent_rewards: Vec<f64>,
    pub mean_reward: f64,
    pub best_reward: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Durable sink for run output.
pub trait RunStore {
    fn record_episode(&mut self, record: &EpisodeRecord) -> Result<()>;

    fn record_checkpoint(&mut self, checkpoint: &CheckpointRecord) -> Result<()>;

    fn record_summary(&mut self, summary: &TrainingSummary, library: &BehaviorLibrary)
        -> Result<()>;
}
