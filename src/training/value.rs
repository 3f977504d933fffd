//! Centralised value estimation for finished conversations.
//!
//! Dimension scores come either from the task's heuristic rubric or from an
//! LLM judge. Any scoring failure is contained here: the conversation gets a
//! degraded reward with every dimension at the configured default.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::metrics::RunMetrics;
use crate::config::{validate_weights, RewardConfig};
use crate::env::Task;
use crate::error::{EvaluationError, InvariantViolation};
use crate::model::prompt::{extract_json_object, judge_prompt};
use crate::model::GenerationBackend;
use crate::trajectory::{estimate_tokens, Reward, Trajectory};

const MIN_SCORE: f64 = 0.0;
const MAX_SCORE: f64 = 10.0;
const JUDGE_MAX_TOKENS: usize = 512;

pub struct ValueEstimator<B> {
    weights: BTreeMap<String, f64>,
    default_score: f64,
    judge: Option<B>,
    /// Judge scores by trajectory content hash.
    judge_cache: Mutex<HashMap<String, BTreeMap<String, f64>>>,
    metrics: Arc<RunMetrics>,
}

impl<B: GenerationBackend> ValueEstimator<B> {
    /// `judge` switches scoring from the task heuristic to an LLM judge.
    pub fn new(
        config: &RewardConfig,
        judge: Option<B>,
        metrics: Arc<RunMetrics>,
    ) -> Result<Self, InvariantViolation> {
        validate_weights(&config.weights)?;
        Ok(Self {
            weights: config.weights.clone(),
            default_score: config.default_score,
            judge,
            judge_cache: Mutex::new(HashMap::new()),
            metrics,
        })
    }

    pub fn uses_judge(&self) -> bool {
        self.judge.is_some()
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    /// Score a finished trajectory.
    ///
    /// Only structural problems are returned as errors; scoring failures
    /// yield a degraded reward.
    pub async fn evaluate<T: Task>(
        &self,
        trajectory: &Trajectory,
        task: &T,
    ) -> Result<Reward, InvariantViolation> {
        let scored = match &self.judge {
            Some(judge) => self.judge_scores(judge, trajectory, task.task_type()).await,
            None => task.score(trajectory),
        };

        match scored {
            Ok(mut dimensions) => {
                for name in self.weights.keys() {
                    dimensions
                        .entry(name.clone())
                        .or_insert(self.default_score);
                }
                for score in dimensions.values_mut() {
                    *score = score.clamp(MIN_SCORE, MAX_SCORE);
                }
                let reward = Reward::weighted(dimensions, &self.weights)?;
                debug!(trajectory = %trajectory.id, total = reward.total, "trajectory scored");
                Ok(reward)
            }
            Err(e) => {
                warn!(
                    trajectory = %trajectory.id,
                    error = %e,
                    "scoring failed, using default reward"
                );
                self.metrics.record_evaluation_fallback();
                Reward::fallback(&self.weights, self.default_score)
            }
        }
    }

    async fn judge_scores(
        &self,
        judge: &B,
        trajectory: &Trajectory,
        task_type: &str,
    ) -> Result<BTreeMap<String, f64>, EvaluationError> {
        let hash = trajectory.content_hash();
        if let Some(cached) = self.cached(&hash) {
            debug!(hash = &hash[..12], "judge cache hit");
            return Ok(cached);
        }

        let dimensions: Vec<&str> = self.weights.keys().map(String::as_str).collect();
        let prompt = judge_prompt(&trajectory.full_conversation(), task_type, &dimensions);
        let response = judge
            .generate(&prompt.system, &prompt.user, 0.0, JUDGE_MAX_TOKENS)
            .await?;
        self.metrics.record_tokens(
            estimate_tokens(&prompt.system)
                + estimate_tokens(&prompt.user)
                + estimate_tokens(&response),
        );
        let scores = parse_judge_scores(&response, &dimensions, self.default_score)?;

        self.judge_cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(hash, scores.clone());
        Ok(scores)
    }

    fn cached(&self, hash: &str) -> Option<BTreeMap<String, f64>> {
        self.judge_cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(hash)
            .cloned()
    }

    pub fn judge_cache_len(&self) -> usize {
        self.judge_cache.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Read `dimensions` out of a judge's JSON answer. Missing or non-numeric
/// fields take `default_score`; values are clamped to 0-10.
pub fn parse_judge_scores(
    response: &str,
    dimensions: &[&str],
    default_score: f64,
) -> Result<BTreeMap<String, f64>, EvaluationError> {
    let json = extract_json_object(response)
        .ok_or_else(|| EvaluationError::Parse("no JSON object in judge response".into()))?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| EvaluationError::Parse(e.to_string()))?;
    if !value.is_object() {
        return Err(EvaluationError::Parse("judge response is not an object".into()));
    }
    Ok(dimensions
        .iter()
        .map(|d| {
            let score = value
                .get(*d)
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(default_score)
                .clamp(MIN_SCORE, MAX_SCORE);
            (d.to_string(), score)
        })
        .collect())
}

/// Split `total` equally across the agents that spoke, ordered by agent id.
pub fn credit_assignment(trajectory: &Trajectory, total: f64) -> Vec<(usize, f64)> {
    let participants = trajectory.participants();
    if participants.is_empty() {
        return Vec::new();
    }
    let share = total / participants.len() as f64;
    participants.into_iter().map(|id| (id, share)).collect()
}
