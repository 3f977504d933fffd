//! Mining winning conversations for reusable behaviors.
//!
//! The top fraction of recent winners (by reward) is shown to a summarizer
//! model, whose JSON answer `{role: {category: [behavior, ...]}}` is mapped
//! back onto agents. A failed call or unparseable answer yields no snippets.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use ordered_float::OrderedFloat;
use tracing::{info, warn};

use super::types::BehaviorSnippet;
use crate::agent::AgentProfile;
use crate::model::prompt::{behavior_extraction_prompt, extract_json_object};
use crate::model::GenerationBackend;
use crate::training::RunMetrics;
use crate::trajectory::{estimate_tokens, Trajectory};

const EXTRACTION_TEMPERATURE: f64 = 0.3;
const EXTRACTION_MAX_TOKENS: usize = 2048;

/// Number of top episodes out of `n` for `fraction`: `ceil(n * fraction)`,
/// at least one (zero only when `n` is zero).
pub fn top_count(n: usize, fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    ((n as f64 * fraction).ceil() as usize).clamp(1, n)
}

/// The best `top_count(len, fraction)` scored episodes, highest reward first.
/// Equal rewards keep their original order.
pub fn select_top(episodes: &[Trajectory], fraction: f64) -> Vec<&Trajectory> {
    let mut scored: Vec<&Trajectory> =
        episodes.iter().filter(|t| t.reward.is_some()).collect();
    scored.sort_by_key(|t| std::cmp::Reverse(OrderedFloat(t.total_reward().unwrap_or(0.0))));
    scored.truncate(top_count(scored.len(), fraction));
    scored
}

pub struct BehaviorExtractor<B> {
    backend: B,
    top_fraction: f64,
    max_prompt_episodes: usize,
    categories: Vec<String>,
    metrics: Arc<RunMetrics>,
}

impl<B: GenerationBackend> BehaviorExtractor<B> {
    pub fn new(
        backend: B,
        top_fraction: f64,
        max_prompt_episodes: usize,
        categories: Vec<String>,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        Self {
            backend,
            top_fraction,
            max_prompt_episodes,
            categories,
            metrics,
        }
    }

    /// Snippets per agent id, mined from the top episodes of `recent`.
    pub async fn extract(
        &self,
        recent: &[Trajectory],
        roster: &[AgentProfile],
        task_type: &str,
    ) -> HashMap<usize, Vec<BehaviorSnippet>> {
        let top = select_top(recent, self.top_fraction);
        if top.is_empty() {
            warn!("no scored episodes for behavior extraction");
            return HashMap::new();
        }
        info!(
            top = top.len(),
            window = recent.len(),
            "analyzing top episodes for behavior extraction"
        );

        let shown: Vec<(f64, String)> = top
            .iter()
            .take(self.max_prompt_episodes)
            .map(|t| (t.total_reward().unwrap_or(0.0), t.full_conversation()))
            .collect();
        let roles: Vec<String> = roster.iter().map(|p| p.role.clone()).collect();
        let categories: Vec<&str> = self.categories.iter().map(String::as_str).collect();
        let prompt = behavior_extraction_prompt(&shown, &roles, task_type, &categories);

        let response = match self
            .backend
            .generate(&prompt.system, &prompt.user, EXTRACTION_TEMPERATURE, EXTRACTION_MAX_TOKENS)
            .await
        {
            Ok(text) => {
                self.metrics.record_tokens(
                    estimate_tokens(&prompt.system)
                        + estimate_tokens(&prompt.user)
                        + estimate_tokens(&text),
                );
                text
            }
            Err(e) => {
                warn!(error = %e, "behavior extraction call failed");
                return HashMap::new();
            }
        };

        match parse_behavior_response(&response, roster) {
            Ok(snippets) => group_by_agent(snippets),
            Err(e) => {
                warn!(error = %e, "failed to parse behavior response");
                HashMap::new()
            }
        }
    }
}

/// Parse `{role: {category: [text, ...]}}`, keeping only roles in `roster`.
pub fn parse_behavior_response(
    response: &str,
    roster: &[AgentProfile],
) -> Result<Vec<BehaviorSnippet>> {
    let json = extract_json_object(response).context("no JSON object in behavior response")?;
    let parsed: BTreeMap<String, BTreeMap<String, Vec<String>>> = serde_json::from_str(json)
        .context("behavior response does not match {role: {category: [..]}}")?;

    let mut snippets = Vec::new();
    for profile in roster {
        let Some(categories) = parsed.get(&profile.role) else {
            continue;
        };
        for (category, texts) in categories {
            for text in texts {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                snippets.push(BehaviorSnippet {
                    agent_id: profile.id,
                    role: profile.role.clone(),
                    category: category.clone(),
                    text: text.to_string(),
                });
            }
        }
    }
    Ok(snippets)
}

fn group_by_agent(snippets: Vec<BehaviorSnippet>) -> HashMap<usize, Vec<BehaviorSnippet>> {
    let mut grouped: HashMap<usize, Vec<BehaviorSnippet>> = HashMap::new();
    for snippet in snippets {
        grouped.entry(snippet.agent_id).or_default().push(snippet);
    }
    grouped
}
