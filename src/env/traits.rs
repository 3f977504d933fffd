//! Core task trait.
//!
//! A task supplies each agent's base instructions, decides when a
//! conversation is finished and scores finished conversations per dimension.

use std::collections::BTreeMap;

use crate::agent::AgentProfile;
use crate::error::EvaluationError;
use crate::trajectory::Trajectory;

pub trait Task: Send + Sync {
    /// Short label for the task family (e.g. "collaboration"), used in prompts.
    fn task_type(&self) -> &str;

    /// Advance to the next task instance and return its description.
    fn reset(&mut self) -> String;

    /// Base instructions for `agent`, given the whole roster.
    fn initial_prompt(&self, agent: &AgentProfile, roster: &[AgentProfile]) -> String;

    /// Whether `trajectory` has reached a natural end.
    fn is_episode_complete(&self, trajectory: &Trajectory) -> bool;

    /// Score a finished conversation. Values are expected in 0-10.
    fn score(&self, trajectory: &Trajectory) -> Result<BTreeMap<String, f64>, EvaluationError>;
}
