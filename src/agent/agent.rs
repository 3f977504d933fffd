//! Cooperating agents and their versioned prompt state.
//!
//! An agent's instructions evolve only through
//! [`apply_snippets`](crate::behavior::apply_snippets), which returns a new
//! [`AgentPromptState`] instead of mutating in place.

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;

/// Heading placed above learned behaviors in the system prompt.
pub const LEARNED_BEHAVIORS_HEADER: &str = "Learned Successful Behaviors:";

/// Identity of one agent in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Position in the roster; also the turn-rotation key.
    pub id: usize,
    pub role: String,
    pub goal: String,
}

/// Base instructions plus the ordered list of learned behaviors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPromptState {
    pub base_instructions: String,
    /// Oldest first.
    pub learned_behaviors: Vec<String>,
    /// Incremented each time a behavior is appended.
    pub version: u64,
}

impl AgentPromptState {
    pub fn new(base_instructions: impl Into<String>) -> Self {
        Self {
            base_instructions: base_instructions.into(),
            learned_behaviors: Vec::new(),
            version: 0,
        }
    }

    /// Render the system prompt with the `recent` most recent behaviors.
    pub fn render(&self, recent: usize) -> String {
        let mut prompt = self.base_instructions.clone();
        let skip = self.learned_behaviors.len().saturating_sub(recent);
        let shown = &self.learned_behaviors[skip..];
        if !shown.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(LEARNED_BEHAVIORS_HEADER);
            prompt.push('\n');
            for behavior in shown {
                prompt.push_str("- ");
                prompt.push_str(behavior);
                prompt.push('\n');
            }
        }
        prompt
    }
}

/// An agent: identity plus current prompt state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub profile: AgentProfile,
    pub prompt: AgentPromptState,
}

impl Agent {
    pub fn new(profile: AgentProfile, base_instructions: impl Into<String>) -> Self {
        Self {
            profile,
            prompt: AgentPromptState::new(base_instructions),
        }
    }

    pub fn id(&self) -> usize {
        self.profile.id
    }

    pub fn role(&self) -> &str {
        &self.profile.role
    }

    /// Snapshot of the system prompt used for a generation call.
    pub fn system_prompt(&self, recent_behaviors: usize) -> String {
        self.prompt.render(recent_behaviors)
    }
}

/// Profiles for the configured roster, ids assigned in order.
pub fn profiles_from_config(configs: &[AgentConfig]) -> Vec<AgentProfile> {
    configs
        .iter()
        .enumerate()
        .map(|(id, c)| AgentProfile {
            id,
            role: c.role.clone(),
            goal: c.goal.clone(),
        })
        .collect()
}
