//! Task abstractions and the bundled demo task.
//!
//! Every task implements the [`Task`] trait so the trainer can drive any
//! conversation problem uniformly.
//!
//! Included tasks:
//! - **Collaboration** ([`collaboration`]) -- open-ended design problems
//!   scored on quality, collaboration and efficiency.

pub mod collaboration;
pub mod traits;

pub use collaboration::{CollaborationTask, COMPLETION_MARKER};
pub use traits::Task;
