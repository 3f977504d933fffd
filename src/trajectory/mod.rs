//! Conversation records and the beam that holds them during search.
//!
//! - [`types::Turn`], [`types::Trajectory`], [`types::Reward`] -- what one
//!   candidate conversation looks like and how it was scored.
//! - [`beam::Beam`] -- bounded, stably-pruned set of candidates, ranked by a
//!   pluggable [`beam::ProvisionalScorer`].

pub mod beam;
pub mod types;

pub use beam::{
    scorer_for, Beam, ContentLengthScorer, ProvisionalScorer, ScoredTrajectory, TurnCountScorer,
};
pub use types::{estimate_tokens, Reward, Trajectory, Turn, TurnMetadata};
