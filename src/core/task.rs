//! Task - one deduplicated execution of a runnable
//!
//! A task runs at most once. The first caller of [`Task::run`] executes the
//! body; concurrent callers block on the once-guard until it has finished and
//! then observe the same terminal state.

use super::context::Context;
use super::identity::Identity;
use super::panics;
use crate::error::TaskError;
use crate::report::Reporter;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;

/// Sequential task ID, assigned by the registry
pub type TaskId = usize;

/// A named piece of runnable code
pub trait Runnable: Send + Sync {
    /// Human-readable name
    fn name(&self) -> String;

    /// Deduplication key; defaults to the name
    fn identity(&self) -> Identity {
        Identity::new(self.name())
    }

    /// Run the body. Dependencies are declared through `ctx`.
    fn run(&self, ctx: &Context) -> anyhow::Result<()>;
}

impl<R: Runnable + ?Sized> Runnable for Arc<R> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn identity(&self) -> Identity {
        (**self).identity()
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        (**self).run(ctx)
    }
}

/// Output channel of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn other(self) -> Self {
        match self {
            Self::Stdout => Self::Stderr,
            Self::Stderr => Self::Stdout,
        }
    }
}

/// A complete, newline-terminated line of captured output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: Stream,
    pub line: String,
}

/// A span of task execution, either computation or waiting for subtasks.
///
/// `start` and `end` are wall-clock timestamps for display; the duration is
/// measured on the monotonic clock.
#[derive(Clone)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub subtasks: Vec<Arc<Task>>,
    pub(crate) elapsed: Duration,
}

impl Span {
    pub fn duration(&self) -> Duration {
        self.elapsed
    }

    pub fn is_compute(&self) -> bool {
        self.subtasks.is_empty()
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subtasks: Vec<TaskId> = self.subtasks.iter().map(|t| t.id()).collect();
        f.debug_struct("Span")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("elapsed", &self.elapsed)
            .field("subtasks", &subtasks)
            .finish()
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Default)]
struct Record {
    state: Option<TaskState>,
    spans: Vec<Span>,
    error: Option<TaskError>,
    output: Vec<LogLine>,
}

/// Single execution of a task
pub struct Task {
    id: TaskId,
    name: String,
    identity: Identity,
    runnable: Arc<dyn Runnable>,

    once: Once,
    // Filled during run()
    record: Mutex<Record>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        identity: Identity,
        runnable: Arc<dyn Runnable>,
    ) -> Self {
        Self {
            id,
            name,
            identity,
            runnable,
            once: Once::new(),
            record: Mutex::new(Record::default()),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Formatted task ID, `#0042`
    pub fn string_id(&self) -> String {
        format!("#{:04}", self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last path segment of the name, for space-constrained displays
    pub fn short_name(&self) -> &str {
        let tail = self.name.rsplit("::").next().unwrap_or(&self.name);
        tail.rsplit('.').next().unwrap_or(tail)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> TaskState {
        self.record().state.unwrap_or(TaskState::Created)
    }

    pub fn spans(&self) -> Vec<Span> {
        self.record().spans.clone()
    }

    /// Terminal error, `None` if the task succeeded or has not finished
    pub fn error(&self) -> Option<TaskError> {
        self.record().error.clone()
    }

    pub fn failed(&self) -> bool {
        self.record().error.is_some()
    }

    /// Captured output history
    pub fn output(&self) -> Vec<LogLine> {
        self.record().output.clone()
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.record().spans.first().map(|s| s.start)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.record().spans.last().map(|s| s.end)
    }

    /// Time between the first span start and the last span end
    pub fn duration(&self) -> Duration {
        // Spans are contiguous
        self.record().spans.iter().map(Span::duration).sum()
    }

    /// Time spent in computation spans only
    pub fn self_duration(&self) -> Duration {
        self.record()
            .spans
            .iter()
            .filter(|s| s.is_compute())
            .map(Span::duration)
            .sum()
    }

    pub fn subtasks_duration(&self) -> Duration {
        self.duration().saturating_sub(self.self_duration())
    }

    /// Run the task, or wait for the run already in progress.
    pub fn run(self: &Arc<Self>, ctx: &Context) {
        self.once.call_once(|| self.execute(ctx));
    }

    fn execute(self: &Arc<Self>, parent: &Context) {
        let reporters = parent.scheduler().reporters().clone();

        self.record().state = Some(TaskState::Running);
        log::debug!("Running task {}", self);
        reporters.started(self);

        let ctx = parent.enter(self.clone());
        let result = panics::catch(|| self.runnable.run(&ctx));

        let error = match result {
            Ok(Ok(())) => ctx.take_failure(),
            Ok(Err(err)) => Some(TaskError::from(err)),
            Err(caught) => Some(TaskError::from_panic(caught.payload, caught.location)),
        };

        ctx.flush_output();
        ctx.close_span(Vec::new());

        {
            let mut record = self.record();
            record.state = Some(if error.is_some() {
                TaskState::Failed
            } else {
                TaskState::Succeeded
            });
            record.error = error;
        }

        log::debug!("Finished task {} ({})", self, self.state());
        reporters.finished(self);
    }

    pub(crate) fn push_span(&self, span: Span) {
        self.record().spans.push(span);
    }

    pub(crate) fn store_line(&self, line: LogLine) {
        self.record().output.push(line);
    }

    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:04} {}", self.id, self.name)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
