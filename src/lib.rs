//! Tusk - build target orchestration
//!
//! Targets are plain functions or [`Runnable`] values. A running target
//! declares its dependencies through its [`Context`]; every dependency runs
//! exactly once per scheduler, however many tasks ask for it, and
//! independent dependencies run concurrently.
//!
//! ```
//! use std::sync::Arc;
//! use tusk::{CancelToken, Context, Scheduler, TaskSpec};
//!
//! fn generate() {}
//!
//! fn compile(ctx: &Context) -> anyhow::Result<()> {
//!     ctx.dep(TaskSpec::new("generate", generate))?;
//!     Ok(())
//! }
//!
//! let scheduler = Arc::new(Scheduler::new(Vec::new()));
//! scheduler
//!     .context(CancelToken::new())
//!     .dep(TaskSpec::new("compile", compile))
//!     .unwrap();
//! assert_eq!(scheduler.tasks().len(), 2);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod failure;
pub mod report;
pub mod toplevel;
pub mod trace;
pub mod ui;

// Re-exports
pub use crate::core::{
    CancelToken, Context, Identity, IntoRunnable, LogLine, Runnable, Scheduler, Span, Stream,
    Task, TaskId, TaskSpec, TaskState, TaskWriter,
};
pub use error::{Interrupted, InvalidTask, SubtasksFailure, TaskError};
pub use report::{PlainReporter, Reporter, Reporters};
pub use toplevel::{Program, Target};
pub use ui::{try_terminal_reporter, TerminalReporter, TerminalUnavailable};

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
