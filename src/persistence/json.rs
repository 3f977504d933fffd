//! File-backed run store.
//!
//! Layout under `<root>/run_<YYYYmmdd_HHMMSS>/`:
//! - `episodes/episode_NNNN.json` -- one winner per episode
//! - `rewards.csv` -- episode, total, one column per dimension, turns
//! - `checkpoint_epN.json`
//! - `summary.json` and `learned_behaviors.json` at the end of a run

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::store::{CheckpointRecord, EpisodeRecord, RunStore};
use crate::behavior::BehaviorLibrary;
use crate::training::TrainingSummary;

#[derive(Debug)]
pub struct JsonRunStore {
    run_dir: PathBuf,
    /// Dimension columns of `rewards.csv`, fixed by the first episode.
    csv_dimensions: Option<Vec<String>>,
}

impl JsonRunStore {
    /// Create a fresh timestamped run directory under `root`.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let run_dir = root.as_ref().join(format!("run_{stamp}"));
        Self::open(run_dir)
    }

    /// Use `run_dir` as-is, creating it if needed.
    pub fn open(run_dir: impl Into<PathBuf>) -> Result<Self> {
        let run_dir = run_dir.into();
        std::fs::create_dir_all(run_dir.join("episodes"))
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;
        info!(path = %run_dir.display(), "run directory ready");
        Ok(Self {
            run_dir,
            csv_dimensions: None,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<PathBuf> {
        let path = self.run_dir.join(relative);
        let json = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {relative}"))?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn append_reward_row(&mut self, record: &EpisodeRecord) -> Result<()> {
        let path = self.run_dir.join("rewards.csv");
        let dims = self
            .csv_dimensions
            .get_or_insert_with(|| record.reward.dimensions.keys().cloned().collect())
            .clone();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        if file.metadata().map(|m| m.len() == 0).unwrap_or(true) {
            writeln!(file, "episode,total,{},turns", dims.join(","))?;
        }
        let values: Vec<String> = dims
            .iter()
            .map(|d| format!("{:.2}", record.reward.dimensions.get(d).copied().unwrap_or(0.0)))
            .collect();
        writeln!(
            file,
            "{},{:.2},{},{}",
            record.episode,
            record.reward.total,
            values.join(","),
            record.trajectory.len()
        )
        .with_context(|| format!("Failed to append to {}", path.display()))?;
        Ok(())
    }
}

impl RunStore for JsonRunStore {
    fn record_episode(&mut self, record: &EpisodeRecord) -> Result<()> {
        let name = format!("episodes/episode_{:04}.json", record.episode);
        self.write_json(&name, record)?;
        self.append_reward_row(record)
    }

    fn record_checkpoint(&mut self, checkpoint: &CheckpointRecord) -> Result<()> {
        let path = self.write_json(
            &format!("checkpoint_ep{}.json", checkpoint.episode),
            checkpoint,
        )?;
        info!(path = %path.display(), "checkpoint saved");
        Ok(())
    }

    fn record_summary(
        &mut self,
        summary: &TrainingSummary,
        library: &BehaviorLibrary,
    ) -> Result<()> {
        self.write_json("summary.json", summary)?;
        library.save_to_file(self.run_dir.join("learned_behaviors.json"))?;
        info!(path = %self.run_dir.display(), "results saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::agent::AgentProfile;
    use crate::persistence::store::{AgentSnapshot, EpisodeMetadata};
    use crate::trajectory::{Reward, Trajectory, Turn};
    use crate::training::MetricsSnapshot;

    fn record(episode: usize) -> EpisodeRecord {
        let agent = AgentProfile {
            id: 0,
            role: "writer".into(),
            goal: String::new(),
        };
        let mut trajectory = Trajectory::new("task", 4);
        trajectory.add_turn(Turn::new(&agent, "hello", 0)).unwrap();
        let reward = Reward {
            dimensions: BTreeMap::from([
                ("collaboration".to_string(), 6.0),
                ("quality".to_string(), 8.0),
            ]),
            total: 7.0,
            degraded: false,
        };
        EpisodeRecord {
            episode,
            trajectory,
            reward,
            metadata: EpisodeMetadata {
                task_description: "task".into(),
                candidates: 1,
                candidate_rewards: vec![7.0],
                advantages: vec![0.0],
                selected_index: 0,
                credit: vec![(0, 7.0)],
                duration_ms: 3,
                recorded_at: Utc::now(),
            },
            saved: true,
        }
    }

    #[test]
    fn test_episode_files_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonRunStore::open(dir.path().join("run")).unwrap();
        store.record_episode(&record(1)).unwrap();
        store.record_episode(&record(2)).unwrap();

        assert!(store.run_dir().join("episodes/episode_0001.json").exists());
        assert!(store.run_dir().join("episodes/episode_0002.json").exists());
        let csv = std::fs::read_to_string(store.run_dir().join("rewards.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "episode,total,collaboration,quality,turns");
        assert_eq!(lines[1], "1,7.00,6.00,8.00,1");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_episode_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonRunStore::open(dir.path()).unwrap();
        store.record_episode(&record(7)).unwrap();
        let text =
            std::fs::read_to_string(store.run_dir().join("episodes/episode_0007.json")).unwrap();
        let loaded: EpisodeRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded.episode, 7);
        assert_eq!(loaded.trajectory.len(), 1);
    }

    #[test]
    fn test_checkpoint_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonRunStore::create(dir.path()).unwrap();
        assert!(store
            .run_dir()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("run_"));
        store
            .record_checkpoint(&CheckpointRecord {
                episode: 5,
                agents: vec![AgentSnapshot {
                    id: 0,
                    role: "writer".into(),
                    prompt: crate::agent::AgentPromptState::new("base"),
                }],
                recent_rewards: vec![1.0],
                mean_reward: 1.0,
                best_reward: 1.0,
                recorded_at: Utc::now(),
            })
            .unwrap();
        let summary = TrainingSummary::from_rewards(
            &[1.0],
            0,
            BTreeMap::new(),
            MetricsSnapshot::default(),
        );
        store.record_summary(&summary, &BehaviorLibrary::new()).unwrap();
        assert!(store.run_dir().join("checkpoint_ep5.json").exists());
        assert!(store.run_dir().join("summary.json").exists());
        assert!(store.run_dir().join("learned_behaviors.json").exists());
    }
}
