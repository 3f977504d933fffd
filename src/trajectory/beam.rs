//! Bounded beam of candidate trajectories.
//!
//! Candidates are staged with a provisional score and pruned to the beam
//! width with a stable sort, so equal scores keep their generation order.

use ordered_float::OrderedFloat;

use super::types::Trajectory;
use crate::config::ProvisionalScorerKind;
use crate::error::InvariantViolation;

// ---------------------------------------------------------------------------
// Provisional scoring
// ---------------------------------------------------------------------------

/// Cheap ranking heuristic applied to partial trajectories before pruning.
pub trait ProvisionalScorer: Send + Sync {
    fn score(&self, trajectory: &Trajectory) -> f64;
}

/// Scores by number of turns. All children of one turn tie, so pruning
/// keeps them in generation order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnCountScorer;

impl ProvisionalScorer for TurnCountScorer {
    fn score(&self, trajectory: &Trajectory) -> f64 {
        trajectory.len() as f64
    }
}

/// Prefers conversations with more substance: mean characters per turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentLengthScorer;

impl ProvisionalScorer for ContentLengthScorer {
    fn score(&self, trajectory: &Trajectory) -> f64 {
        if trajectory.is_empty() {
            return 0.0;
        }
        let chars: usize = trajectory
            .turns()
            .iter()
            .map(|t| t.content.chars().count())
            .sum();
        chars as f64 / trajectory.len() as f64
    }
}

/// Build the scorer selected in configuration.
pub fn scorer_for(kind: ProvisionalScorerKind) -> Box<dyn ProvisionalScorer> {
    match kind {
        ProvisionalScorerKind::TurnCount => Box::new(TurnCountScorer),
        ProvisionalScorerKind::ContentLength => Box::new(ContentLengthScorer),
    }
}

// ---------------------------------------------------------------------------
// Beam
// ---------------------------------------------------------------------------

/// A trajectory together with its provisional score.
#[derive(Debug, Clone)]
pub struct ScoredTrajectory {
    pub trajectory: Trajectory,
    pub score: f64,
}

/// Fixed-capacity set of trajectories.
#[derive(Debug, Clone)]
pub struct Beam {
    width: usize,
    members: Vec<ScoredTrajectory>,
}

impl Beam {
    pub fn new(width: usize) -> Result<Self, InvariantViolation> {
        if width == 0 {
            return Err(InvariantViolation::new("beam width must be at least 1"));
        }
        Ok(Self {
            width,
            members: Vec::new(),
        })
    }

    /// A beam holding one empty trajectory, the start of every episode.
    pub fn seeded(width: usize, root: Trajectory) -> Result<Self, InvariantViolation> {
        let mut beam = Self::new(width)?;
        beam.push(root, 0.0);
        Ok(beam)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Stage a candidate. The beam may exceed its width until [`prune`](Self::prune).
    pub fn push(&mut self, trajectory: Trajectory, score: f64) {
        self.members.push(ScoredTrajectory { trajectory, score });
    }

    /// Keep the `width` best candidates, highest score first; ties keep
    /// insertion order.
    pub fn prune(&mut self) {
        // `sort_by_key` is stable.
        self.members
            .sort_by_key(|m| std::cmp::Reverse(OrderedFloat(m.score)));
        self.members.truncate(self.width);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[ScoredTrajectory] {
        &self.members
    }

    pub fn into_members(self) -> Vec<ScoredTrajectory> {
        self.members
    }

    pub fn into_trajectories(self) -> Vec<Trajectory> {
        self.members.into_iter().map(|m| m.trajectory).collect()
    }

    /// True when no member can be expanded further.
    pub fn all_finished(&self) -> bool {
        self.members.iter().all(|m| m.trajectory.done)
    }
}
