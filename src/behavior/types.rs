use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short mined instruction scoped to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorSnippet {
    pub agent_id: usize,
    pub role: String,
    /// e.g. "collaboration", "quality".
    pub category: String,
    pub text: String,
}

/// A record of when a snippet entered the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorHistoryEntry {
    pub role: String,
    pub category: String,
    pub text: String,
    pub added_at: DateTime<Utc>,
    /// Extraction cycle that produced the snippet (1 = first update).
    pub update_cycle: usize,
}
