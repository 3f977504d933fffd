//! Colloquy: multi-agent conversation training by beam search and
//! behavior mining.
//!
//! A fixed roster of LLM agents takes turns on a task. Each episode explores
//! candidate conversations with a bounded beam, scores the finished ones,
//! keeps a winner by group-relative advantage, and every few episodes folds
//! behaviors summarized from the best winners back into agent prompts.

pub mod agent;
pub mod behavior;
pub mod config;
pub mod env;
pub mod error;
pub mod generation;
pub mod model;
pub mod persistence;
pub mod trajectory;
pub mod training;
