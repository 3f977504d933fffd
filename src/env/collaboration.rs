//! A generic collaborative problem-solving task.
//!
//! Agents take turns on a design problem until every role has spoken and the
//! latest turn carries [`COMPLETION_MARKER`]. Scoring is heuristic:
//! - **quality**: depth of contributions (mean words per turn).
//! - **collaboration**: how often a turn picks up vocabulary from the turn
//!   before it.
//! - **efficiency**: how few of the allowed turns were needed.

use std::collections::{BTreeMap, HashSet};

use super::traits::Task;
use crate::agent::AgentProfile;
use crate::error::EvaluationError;
use crate::trajectory::Trajectory;

/// Phrase an agent writes to signal the team is done.
pub const COMPLETION_MARKER: &str = "FINAL ANSWER";

/// Mean words per turn that earns a full quality score.
const FULL_DEPTH_WORDS: f64 = 40.0;

/// Shortest word counted as shared vocabulary between turns.
const MIN_SHARED_WORD_LEN: usize = 5;

const DEFAULT_TASKS: &[&str] = &[
    "Design a rate limiter for a public HTTP API serving ten thousand clients.",
    "Plan the migration of a monolithic billing service to event-driven components.",
    "Propose a caching strategy for a read-heavy product catalogue.",
    "Outline an on-call process for a five-person infrastructure team.",
    "Design the data model for a collaborative document editor.",
];

#[derive(Debug, Clone)]
pub struct CollaborationTask {
    tasks: Vec<String>,
    cursor: usize,
    roster_size: usize,
}

impl CollaborationTask {
    pub fn new(roster_size: usize) -> Self {
        Self::with_tasks(roster_size, DEFAULT_TASKS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_tasks(roster_size: usize, tasks: Vec<String>) -> Self {
        Self {
            tasks,
            cursor: 0,
            roster_size,
        }
    }
}

impl Task for CollaborationTask {
    fn task_type(&self) -> &str {
        "collaboration"
    }

    fn reset(&mut self) -> String {
        let description = if self.tasks.is_empty() {
            "Solve the problem together.".to_string()
        } else {
            self.tasks[self.cursor % self.tasks.len()].clone()
        };
        self.cursor += 1;
        description
    }

    fn initial_prompt(&self, agent: &AgentProfile, roster: &[AgentProfile]) -> String {
        let teammates: Vec<&str> = roster
            .iter()
            .filter(|p| p.id != agent.id)
            .map(|p| p.role.as_str())
            .collect();
        let team = if teammates.is_empty() {
            "You are working alone.".to_string()
        } else {
            format!("Your teammates are: {}.", teammates.join(", "))
        };
        format!(
            "You are the {role} in a multi-agent {kind} team. {team}\n\n\
             Your specific goal: {goal}\n\n\
             Guidelines:\n\
             - Read what the others wrote and build on it\n\
             - Be specific and add concrete detail\n\
             - Keep each contribution focused\n\
             - When the team has a complete answer, end your turn with {COMPLETION_MARKER}",
            role = agent.role,
            kind = self.task_type(),
            goal = agent.goal,
        )
    }

    fn is_episode_complete(&self, trajectory: &Trajectory) -> bool {
        let Some(last) = trajectory.last_turn() else {
            return false;
        };
        let spoken: HashSet<usize> = trajectory.turns().iter().map(|t| t.agent_id).collect();
        spoken.len() >= self.roster_size
            && last.content.to_uppercase().contains(COMPLETION_MARKER)
    }

    fn score(&self, trajectory: &Trajectory) -> Result<BTreeMap<String, f64>, EvaluationError> {
        if trajectory.is_empty() {
            return Err(EvaluationError::Scorer("empty trajectory".into()));
        }
        let turns = trajectory.turns();

        let words: usize = turns.iter().map(|t| t.content.split_whitespace().count()).sum();
        let mean_words = words as f64 / turns.len() as f64;
        let quality = (10.0 * mean_words / FULL_DEPTH_WORDS).min(10.0);

        let collaboration = if turns.len() < 2 {
            0.0
        } else {
            let linked = turns
                .windows(2)
                .filter(|w| {
                    let prev = vocabulary(&w[0].content);
                    vocabulary(&w[1].content).iter().any(|word| prev.contains(word))
                })
                .count();
            10.0 * linked as f64 / (turns.len() - 1) as f64
        };

        let max = trajectory.max_turns.max(1) as f64;
        let used = turns.len() as f64;
        let efficiency = (10.0 * (max - used + 1.0) / max).clamp(0.0, 10.0);

        Ok(BTreeMap::from([
            ("quality".to_string(), quality),
            ("collaboration".to_string(), collaboration),
            ("efficiency".to_string(), efficiency),
        ]))
    }
}

fn vocabulary(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_SHARED_WORD_LEN)
        .map(str::to_lowercase)
        .collect()
}
