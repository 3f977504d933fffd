use anyhow::{bail, Result};

use super::store::{CheckpointRecord, EpisodeRecord, RunStore};
use crate::behavior::BehaviorLibrary;
use crate::training::TrainingSummary;

/// Keeps run output in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    pub episodes: Vec<EpisodeRecord>,
    pub checkpoints: Vec<CheckpointRecord>,
    pub summary: Option<TrainingSummary>,
    pub library: Option<BehaviorLibrary>,
    /// Reject episode writes, to exercise the failure path.
    pub reject_episodes: bool,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject_episodes: true,
            ..Self::default()
        }
    }
}

impl RunStore for MemoryRunStore {
    fn record_episode(&mut self, record: &EpisodeRecord) -> Result<()> {
        if self.reject_episodes {
            bail!("episode store is read-only");
        }
        self.episodes.push(record.clone());
        Ok(())
    }

    fn record_checkpoint(&mut self, checkpoint: &CheckpointRecord) -> Result<()> {
        self.checkpoints.push(checkpoint.clone());
        Ok(())
    }

    fn record_summary(
        &mut self,
        summary: &TrainingSummary,
        library: &BehaviorLibrary,
    ) -> Result<()> {
        self.summary = Some(summary.clone());
        self.library = Some(library.clone());
        Ok(())
    }
}
