//! Core engine - task registry, dependency scheduling, cancellation and
//! output capture

mod cancel;
mod context;
mod func;
mod identity;
mod panics;
mod registry;
mod scheduler;
mod streams;
mod task;

pub use cancel::CancelToken;
pub use context::Context;
pub use func::{FuncRunnable, IntoRunnable, TaskFn, TaskShape, TaskSpec};
pub use identity::Identity;
pub use panics::install_panic_hook;
pub use registry::Registry;
pub use scheduler::Scheduler;
pub use streams::TaskWriter;
pub use task::{LogLine, Runnable, Span, Stream, Task, TaskId, TaskState};
