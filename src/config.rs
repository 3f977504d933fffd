use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InvariantViolation;

/// Tolerance when checking that reward weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Complete configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColloquyConfig {
    pub search: SearchConfig,
    pub selection: SelectionConfig,
    pub cache: CacheConfig,
    pub behavior: BehaviorConfig,
    pub reward: RewardConfig,
    pub model: ModelConfig,
    pub run: RunConfig,
    /// The fixed roster of cooperating agents, in turn order.
    pub agents: Vec<AgentConfig>,
}

/// Beam search and sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Beam width W (default: 4).
    pub beam_width: usize,
    /// Samples per turn k (default: 3).
    pub k_samples: usize,
    /// Sampling temperature (default: 0.7).
    pub temperature: f64,
    /// Maximum turns per episode (default: 10).
    pub max_turns: usize,
    /// Maximum tokens per completion (default: 1024).
    pub max_tokens: usize,
    /// Upper bound on concurrent sample batches within one turn (default: 4).
    pub max_concurrency: usize,
    /// Delay between sequential calls of one batch, in milliseconds (default: 250).
    pub inter_call_delay_ms: u64,
    /// How many of the most recent learned behaviors enter the prompt (default: 5).
    pub prompt_behaviors: usize,
    /// Heuristic ranking staged trajectories before pruning.
    pub provisional_scorer: ProvisionalScorerKind,
    /// Abort an episode that runs longer than this.
    pub episode_timeout_secs: Option<u64>,
}

/// Which provisional heuristic ranks partial trajectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionalScorerKind {
    TurnCount,
    ContentLength,
}

/// Winner selection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Probability of soft-max exploration instead of argmax (default: 0.1).
    pub exploration_rate: f64,
    /// Seed for the exploration RNG; entropy-seeded when absent.
    pub seed: Option<u64>,
}

/// Response cache parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached request keys (default: 1000).
    pub capacity: usize,
}

/// Behavior mining parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Extract behaviors every F episodes (default: 10).
    pub update_frequency: usize,
    /// Learned behaviors retained per agent (default: 10).
    pub max_behaviors: usize,
    /// Fraction of the recent window treated as top episodes (default: 0.2).
    pub top_fraction: f64,
    /// How many recent episodes are considered (default: 50).
    pub history_window: usize,
    /// Minimum recorded episodes before extraction runs (default: 5).
    pub min_episodes: usize,
    /// Transcripts shown to the summarizer at most (default: 5).
    pub max_prompt_episodes: usize,
}

/// Reward computation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Dimension weights; must sum to one.
    pub weights: BTreeMap<String, f64>,
    /// Score with an LLM judge instead of the task heuristic.
    pub use_llm_judge: bool,
    /// Conservative per-dimension score used when scoring fails (default: 5.0).
    pub default_score: f64,
}

/// Which generation provider backs the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Mock,
}

/// Model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,
    /// Base URL for the provider API; the provider's public endpoint when unset.
    pub api_base: Option<String>,
    pub api_key: String,
    /// Model used by the agents.
    pub model_id: String,
    /// Model used by the judge and the behavior summarizer.
    pub judge_model_id: String,
}

/// Run bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Root directory for run output (default: "runs").
    pub save_dir: String,
    /// Checkpoint every N episodes (default: 5).
    pub save_frequency: usize,
    /// Episodes per training run (default: 20).
    pub num_episodes: usize,
    /// Stop training once this many estimated tokens have been spent.
    pub max_budget_tokens: Option<u64>,
}

/// One agent profile in the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub role: String,
    pub goal: String,
}

impl Default for ColloquyConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            selection: SelectionConfig::default(),
            cache: CacheConfig::default(),
            behavior: BehaviorConfig::default(),
            reward: RewardConfig::default(),
            model: ModelConfig::default(),
            run: RunConfig::default(),
            agents: vec![
                AgentConfig {
                    role: "writer".into(),
                    goal: "Draft a concrete proposal that answers the task.".into(),
                },
                AgentConfig {
                    role: "reviewer".into(),
                    goal: "Critique and improve the latest proposal.".into(),
                },
            ],
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            beam_width: 4,
            k_samples: 3,
            temperature: 0.7,
            max_turns: 10,
            max_tokens: 1024,
            max_concurrency: 4,
            inter_call_delay_ms: 250,
            prompt_behaviors: 5,
            provisional_scorer: ProvisionalScorerKind::TurnCount,
            episode_timeout_secs: None,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.1,
            seed: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            update_frequency: 10,
            max_behaviors: 10,
            top_fraction: 0.2,
            history_window: 50,
            min_episodes: 5,
            max_prompt_episodes: 5,
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::from([
                ("quality".to_string(), 0.4),
                ("collaboration".to_string(), 0.4),
                ("efficiency".to_string(), 0.2),
            ]),
            use_llm_judge: false,
            default_score: 5.0,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Mock,
            api_base: None,
            api_key: String::new(),
            model_id: "gpt-4o-mini".into(),
            judge_model_id: "gpt-4o".into(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            save_dir: "runs".into(),
            save_frequency: 5,
            num_episodes: 20,
            max_budget_tokens: None,
        }
    }
}

impl ColloquyConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let s = &self.search;
        if s.beam_width == 0 {
            return Err(InvariantViolation::new("beam_width must be at least 1"));
        }
        if s.k_samples == 0 {
            return Err(InvariantViolation::new("k_samples must be at least 1"));
        }
        if s.max_turns == 0 {
            return Err(InvariantViolation::new("max_turns must be at least 1"));
        }
        if s.max_concurrency == 0 {
            return Err(InvariantViolation::new("max_concurrency must be at least 1"));
        }
        if s.episode_timeout_secs == Some(0) {
            return Err(InvariantViolation::new("episode_timeout_secs must be at least 1"));
        }
        if self.run.max_budget_tokens == Some(0) {
            return Err(InvariantViolation::new("max_budget_tokens must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.selection.exploration_rate) {
            return Err(InvariantViolation::new(format!(
                "exploration_rate {} outside [0, 1]",
                self.selection.exploration_rate
            )));
        }
        if self.cache.capacity == 0 {
            return Err(InvariantViolation::new("cache capacity must be at least 1"));
        }
        if self.behavior.update_frequency == 0 {
            return Err(InvariantViolation::new("update_frequency must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.behavior.top_fraction) {
            return Err(InvariantViolation::new("top_fraction outside [0, 1]"));
        }
        if self.agents.is_empty() {
            return Err(InvariantViolation::new("agent roster is empty"));
        }
        validate_weights(&self.reward.weights)
    }
}

/// Weights must be non-negative and sum to one within [`WEIGHT_TOLERANCE`].
pub fn validate_weights(weights: &BTreeMap<String, f64>) -> Result<(), InvariantViolation> {
    if weights.is_empty() {
        return Err(InvariantViolation::new("reward weights are empty"));
    }
    if let Some((name, w)) = weights.iter().find(|(_, w)| **w < 0.0 || !w.is_finite()) {
        return Err(InvariantViolation::new(format!(
            "reward weight {name} = {w} is not a non-negative number"
        )));
    }
    let sum: f64 = weights.values().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(InvariantViolation::new(format!(
            "reward weights sum to {sum}, expected 1"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ColloquyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_beam_width_rejected() {
        let mut config = ColloquyConfig::default();
        config.search.beam_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_and_budget_rejected() {
        let mut config = ColloquyConfig::default();
        config.search.episode_timeout_secs = Some(0);
        assert!(config.validate().unwrap_err().to_string().contains("episode_timeout_secs"));

        let mut config = ColloquyConfig::default();
        config.run.max_budget_tokens = Some(0);
        assert!(config.validate().is_err());

        config.run.max_budget_tokens = Some(1);
        config.search.episode_timeout_secs = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights =
            BTreeMap::from([("quality".to_string(), 0.5), ("efficiency".to_string(), 0.4)]);
        let err = validate_weights(&weights).unwrap_err();
        assert!(err.to_string().contains("sum to"));
    }

    #[test]
    fn test_weights_within_tolerance_accepted() {
        let weights = BTreeMap::from([
            ("a".to_string(), 1.0 / 3.0),
            ("b".to_string(), 1.0 / 3.0),
            ("c".to_string(), 1.0 / 3.0),
        ]);
        assert!(validate_weights(&weights).is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = BTreeMap::from([("a".to_string(), 1.5), ("b".to_string(), -0.5)]);
        assert!(validate_weights(&weights).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ColloquyConfig =
            serde_json::from_str(r#"{"search": {"beam_width": 2}}"#).unwrap();
        assert_eq!(config.search.beam_width, 2);
        assert_eq!(config.search.k_samples, 3);
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.search.provisional_scorer, ProvisionalScorerKind::TurnCount);
    }
}
