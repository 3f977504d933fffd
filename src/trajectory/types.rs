//! Core conversation data types: turns, trajectories and rewards.
//!
//! A [`Trajectory`] is an append-only record of one candidate conversation.
//! Beam expansion branches a parent into several children by cloning; every
//! clone owns its own turn list, so appends never alias.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::agent::AgentProfile;
use crate::config::validate_weights;
use crate::error::InvariantViolation;

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// Per-turn bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// UTC time the turn was recorded.
    pub timestamp: DateTime<Utc>,
    /// Rough token count of the content (chars / 4).
    pub token_estimate: usize,
}

/// One agent's contribution to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub agent_id: usize,
    pub role: String,
    pub content: String,
    /// Zero-based position within the owning trajectory.
    pub index: usize,
    #[serde(default)]
    pub metadata: Option<TurnMetadata>,
}

impl Turn {
    /// Build a turn stamped with the current time and a token estimate.
    pub fn new(agent: &AgentProfile, content: impl Into<String>, index: usize) -> Self {
        let content = content.into();
        let metadata = TurnMetadata {
            timestamp: Utc::now(),
            token_estimate: estimate_tokens(&content),
        };
        Self {
            agent_id: agent.id,
            role: agent.role.clone(),
            content,
            index,
            metadata: Some(metadata),
        }
    }
}

/// Cheap token estimate used for metadata and budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

// ---------------------------------------------------------------------------
// Reward
// ---------------------------------------------------------------------------

/// Named dimension scores plus their weighted total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub dimensions: BTreeMap<String, f64>,
    pub total: f64,
    /// Set when scoring failed and conservative defaults were substituted.
    #[serde(default)]
    pub degraded: bool,
}

impl Reward {
    /// Combine dimension scores with `weights`.
    ///
    /// Every weighted dimension must be present in `dimensions`; extra
    /// dimensions are kept but contribute nothing to the total.
    pub fn weighted(
        dimensions: BTreeMap<String, f64>,
        weights: &BTreeMap<String, f64>,
    ) -> Result<Self, InvariantViolation> {
        validate_weights(weights)?;
        let mut total = 0.0;
        for (name, weight) in weights {
            let score = dimensions.get(name).ok_or_else(|| {
                InvariantViolation::new(format!("reward dimension {name} missing"))
            })?;
            total += weight * score;
        }
        Ok(Self {
            dimensions,
            total,
            degraded: false,
        })
    }

    /// Every weighted dimension at `score`, flagged as degraded.
    pub fn fallback(
        weights: &BTreeMap<String, f64>,
        score: f64,
    ) -> Result<Self, InvariantViolation> {
        let dimensions = weights.keys().map(|k| (k.clone(), score)).collect();
        let mut reward = Self::weighted(dimensions, weights)?;
        reward.degraded = true;
        Ok(reward)
    }
}

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

/// One candidate multi-agent conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// Unique identifier (UUID v4). Clones share their parent's id.
    pub id: String,
    pub task_description: String,
    pub max_turns: usize,
    turns: Vec<Turn>,
    /// Frozen: no further turns are appended.
    pub done: bool,
    /// Cumulative `role: content` lines, one per turn.
    transcript: String,
    /// Final reward, set once by the value estimator.
    pub reward: Option<Reward>,
}

impl Trajectory {
    pub fn new(task_description: impl Into<String>, max_turns: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_description: task_description.into(),
            max_turns,
            turns: Vec::new(),
            done: false,
            transcript: String::new(),
            reward: None,
        }
    }

    /// Clone with a fresh id, used when branching during beam expansion.
    pub fn branch(&self) -> Self {
        let mut child = self.clone();
        child.id = uuid::Uuid::new_v4().to_string();
        child
    }

    /// Append a turn. Indices must be contiguous from zero and the trajectory
    /// must still be open; reaching `max_turns` freezes it.
    pub fn add_turn(&mut self, turn: Turn) -> Result<(), InvariantViolation> {
        if self.done {
            return Err(InvariantViolation::new(format!(
                "trajectory {} is finished, cannot add turn {}",
                self.id, turn.index
            )));
        }
        if turn.index != self.turns.len() {
            return Err(InvariantViolation::new(format!(
                "turn index {} does not follow {} existing turns",
                turn.index,
                self.turns.len()
            )));
        }
        self.transcript.push_str(&turn.role);
        self.transcript.push_str(": ");
        self.transcript.push_str(&turn.content);
        self.transcript.push('\n');
        self.turns.push(turn);
        if self.turns.len() >= self.max_turns {
            self.done = true;
        }
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Index the next appended turn must carry.
    pub fn next_index(&self) -> usize {
        self.turns.len()
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Render the history as generation context for `agent`, in turn order.
    pub fn context_for(&self, agent: &AgentProfile) -> String {
        let mut parts = Vec::with_capacity(self.turns.len() + 3);
        if !self.task_description.is_empty() {
            parts.push(format!("Task: {}\n", self.task_description));
        }
        if self.turns.is_empty() {
            parts.push("(No conversation yet - you're going first)".to_string());
        } else {
            parts.push("Conversation so far:".to_string());
            for turn in &self.turns {
                parts.push(format!("Turn {} | {}: {}", turn.index, turn.role, turn.content));
            }
        }
        parts.push(format!("\nYou are the {}. Take your turn.", agent.role));
        parts.join("\n")
    }

    /// The whole conversation, as shown to judges and summarizers.
    pub fn full_conversation(&self) -> String {
        if self.turns.is_empty() {
            return "(Empty trajectory)".to_string();
        }
        let mut lines = vec![format!("Task: {}\n", self.task_description)];
        for turn in &self.turns {
            lines.push(format!("Turn {} | {}:", turn.index, turn.role));
            lines.push(format!("{}\n", turn.content));
        }
        lines.join("\n")
    }

    /// SHA-256 of [`full_conversation`](Self::full_conversation), hex encoded.
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.full_conversation().as_bytes()))
    }

    /// Agent ids that contributed at least one turn, ascending.
    pub fn participants(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.turns.iter().map(|t| t.agent_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn total_reward(&self) -> Option<f64> {
        self.reward.as_ref().map(|r| r.total)
    }
}
