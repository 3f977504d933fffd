//! Generation backends and prompt templates.
//!
//! This module provides:
//! - [`backend::GenerationBackend`] -- the single capability every provider
//!   implements, and [`backend::AnyBackend`] for choosing one at startup.
//! - [`api::OpenAiBackend`] -- OpenAI-compatible chat completions client.
//! - [`anthropic::AnthropicBackend`] -- Anthropic Messages API client.
//! - [`scripted::ScriptedBackend`] -- deterministic canned responses.
//! - [`prompt`] -- judge and behavior-summarizer templates.

pub mod anthropic;
pub mod api;
pub mod backend;
pub mod prompt;
pub mod scripted;

pub use anthropic::AnthropicBackend;
pub use api::{ChatMessage, ChatResponse, OpenAiBackend};
pub use backend::{AnyBackend, GenerationBackend};
pub use scripted::{ScriptedBackend, ScriptedCall};
