//! Agent module: the cooperating roster.
//!
//! Each [`Agent`] pairs an [`AgentProfile`] with a versioned
//! [`AgentPromptState`] whose learned behaviors are appended to the base
//! instructions at generation time.

pub mod agent;

pub use agent::{
    profiles_from_config, Agent, AgentProfile, AgentPromptState, LEARNED_BEHAVIORS_HEADER,
};
