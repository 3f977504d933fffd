use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::metrics::MetricsSnapshot;

/// End-of-run statistics over the selected winners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub episodes: usize,
    pub mean_reward: f64,
    pub best_reward: f64,
    pub worst_reward: f64,
    /// Mean over the last ten episodes.
    pub recent_mean_reward: f64,
    /// Population standard deviation.
    pub reward_std: f64,
    pub unsaved_episodes: usize,
    /// Estimated tokens spent over the run.
    #[serde(default)]
    pub tokens_spent: u64,
    /// Learned-behavior count per role.
    pub agent_behaviors: BTreeMap<String, usize>,
    pub metrics: MetricsSnapshot,
}

const RECENT_WINDOW: usize = 10;

impl TrainingSummary {
    pub fn from_rewards(
        rewards: &[f64],
        unsaved_episodes: usize,
        agent_behaviors: BTreeMap<String, usize>,
        metrics: MetricsSnapshot,
    ) -> Self {
        if rewards.is_empty() {
            return Self {
                tokens_spent: metrics.tokens_spent,
                agent_behaviors,
                metrics,
                ..Self::default()
            };
        }
        let n = rewards.len() as f64;
        let mean = rewards.iter().sum::<f64>() / n;
        let variance = rewards.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let recent = &rewards[rewards.len().saturating_sub(RECENT_WINDOW)..];
        Self {
            episodes: rewards.len(),
            mean_reward: mean,
            best_reward: rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst_reward: rewards.iter().copied().fold(f64::INFINITY, f64::min),
            recent_mean_reward: recent.iter().sum::<f64>() / recent.len() as f64,
            reward_std: variance.sqrt(),
            unsaved_episodes,
            tokens_spent: metrics.tokens_spent,
            agent_behaviors,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_statistics() {
        let rewards: Vec<f64> = (1..=12).map(f64::from).collect();
        let metrics = MetricsSnapshot {
            tokens_spent: 900,
            ..MetricsSnapshot::default()
        };
        let s = TrainingSummary::from_rewards(&rewards, 1, BTreeMap::new(), metrics);
        assert_eq!(s.episodes, 12);
        assert!((s.mean_reward - 6.5).abs() < 1e-9);
        assert_eq!(s.best_reward, 12.0);
        assert_eq!(s.worst_reward, 1.0);
        // Mean of 3..=12.
        assert!((s.recent_mean_reward - 7.5).abs() < 1e-9);
        assert!(s.reward_std > 0.0);
        assert_eq!(s.unsaved_episodes, 1);
        assert_eq!(s.tokens_spent, 900);
    }

    #[test]
    fn test_summary_empty() {
        let s = TrainingSummary::from_rewards(&[], 0, BTreeMap::new(), MetricsSnapshot::default());
        assert_eq!(s.episodes, 0);
        assert_eq!(s.mean_reward, 0.0);
    }
}
