//! Accumulated behaviors and the prompt-state transition.
//!
//! The [`BehaviorLibrary`] keeps every distinct snippet ever mined, grouped by
//! role and category, with an audit history. What an agent actually sees is
//! its [`AgentPromptState`], advanced only through [`apply_snippets`].

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::types::{BehaviorHistoryEntry, BehaviorSnippet};
use crate::agent::AgentPromptState;

/// Append snippets the state does not already hold, keeping only the most
/// recent `max_behaviors`.
///
/// Duplicates (against existing behaviors and within `snippets`) are skipped
/// by string equality. The version advances only when the resulting list
/// differs from the one in `state`.
pub fn apply_snippets(
    state: &AgentPromptState,
    snippets: &[BehaviorSnippet],
    max_behaviors: usize,
) -> AgentPromptState {
    let mut next = state.clone();
    for snippet in snippets {
        let text = snippet.text.trim();
        if text.is_empty() || next.learned_behaviors.iter().any(|b| b == text) {
            continue;
        }
        next.learned_behaviors.push(text.to_string());
    }
    let excess = next.learned_behaviors.len().saturating_sub(max_behaviors);
    next.learned_behaviors.drain(..excess);
    if next.learned_behaviors != state.learned_behaviors {
        next.version += 1;
    }
    next
}

/// Every distinct snippet mined so far, by role then category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorLibrary {
    behaviors_by_role: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    history: Vec<BehaviorHistoryEntry>,
    #[serde(default)]
    update_cycle: usize,
}

impl BehaviorLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Record one extraction cycle's snippets. Returns how many were new.
    pub fn merge(&mut self, snippets: &[BehaviorSnippet]) -> usize {
        self.update_cycle += 1;
        let mut added = 0;
        for snippet in snippets {
            let bucket = self
                .behaviors_by_role
                .entry(snippet.role.clone())
                .or_default()
                .entry(snippet.category.clone())
                .or_default();
            if bucket.contains(&snippet.text) {
                continue;
            }
            bucket.push(snippet.text.clone());
            self.history.push(BehaviorHistoryEntry {
                role: snippet.role.clone(),
                category: snippet.category.clone(),
                text: snippet.text.clone(),
                added_at: Utc::now(),
                update_cycle: self.update_cycle,
            });
            added += 1;
        }
        added
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Most recent `max` behaviors for `role`, optionally from one category.
    pub fn behaviors_for_role(
        &self,
        role: &str,
        category: Option<&str>,
        max: usize,
    ) -> Vec<String> {
        let Some(categories) = self.behaviors_by_role.get(role) else {
            return Vec::new();
        };
        let all: Vec<String> = match category {
            Some(c) => categories.get(c).cloned().unwrap_or_default(),
            None => categories.values().flatten().cloned().collect(),
        };
        let skip = all.len().saturating_sub(max);
        all[skip..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.behaviors_by_role
            .values()
            .flat_map(|c| c.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_by_role(&self) -> BTreeMap<String, usize> {
        self.behaviors_by_role
            .iter()
            .map(|(role, cats)| (role.clone(), cats.values().map(Vec::len).sum()))
            .collect()
    }

    pub fn history(&self) -> &[BehaviorHistoryEntry] {
        &self.history
    }

    pub fn update_cycle(&self) -> usize {
        self.update_cycle
    }

    /// Human-readable per-role, per-category counts.
    pub fn summary(&self) -> String {
        let mut lines = vec!["Behavior Library Summary:".to_string()];
        for (role, categories) in &self.behaviors_by_role {
            let total: usize = categories.values().map(Vec::len).sum();
            lines.push(format!("\n{role}: {total} behaviors"));
            for (category, behaviors) in categories {
                lines.push(format!("  {category}: {}", behaviors.len()));
            }
        }
        lines.join("\n")
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize BehaviorLibrary to JSON")?;
        std::fs::write(path.as_ref(), json).with_context(|| {
            format!("Failed to write BehaviorLibrary to {}", path.as_ref().display())
        })?;
        tracing::info!(
            path = %path.as_ref().display(),
            behaviors = self.len(),
            "Saved behavior library"
        );
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read BehaviorLibrary from {}", path.as_ref().display())
        })?;
        let library: Self =
            serde_json::from_str(&data).context("Failed to deserialize BehaviorLibrary JSON")?;
        tracing::info!(
            path = %path.as_ref().display(),
            behaviors = library.len(),
            "Loaded behavior library"
        );
        Ok(library)
    }
}
