//! Behavior mining and prompt evolution.
//!
//! The only channel by which agents change across episodes:
//!
//! 1. **Extract** ([`extraction`]) -- summarize the top recent winners into
//!    per-agent, per-category [`BehaviorSnippet`]s.
//! 2. **Accumulate** ([`library`]) -- keep every distinct snippet with an
//!    audit history; save and load as JSON.
//! 3. **Apply** ([`apply_snippets`]) -- derive each agent's next
//!    [`AgentPromptState`](crate::agent::AgentPromptState).

pub mod extraction;
pub mod library;
pub mod types;

pub use extraction::{parse_behavior_response, select_top, top_count, BehaviorExtractor};
pub use library::{apply_snippets, BehaviorLibrary};
pub use types::{BehaviorHistoryEntry, BehaviorSnippet};
