//! Execution context and dependency scheduling
//!
//! Every task body receives a [`Context`]. It carries the scheduler, the
//! cancellation token and the scope of the running task, and it is the only
//! way to declare dependencies.

use super::cancel::CancelToken;
use super::func::IntoRunnable;
use super::scheduler::Scheduler;
use super::streams::{Multiplexer, TaskWriter};
use super::task::{Runnable, Span, Stream, Task};
use crate::error::{InvalidTask, SubtasksFailure, TaskError};
use crate::report::Reporter;
use chrono::{DateTime, Utc};
use crossbeam_channel::bounded;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Context handed to task bodies
#[derive(Clone)]
pub struct Context {
    scheduler: Arc<Scheduler>,
    cancel: CancelToken,
    scope: Option<Arc<TaskScope>>,
}

/// State owned by one running task
struct TaskScope {
    task: Arc<Task>,
    // Wall-clock and monotonic start of the open span
    next_span_start: Mutex<(DateTime<Utc>, Instant)>,
    output: Arc<Mutex<Multiplexer>>,
    // First failed dependency join, kept even if the body ignores it
    failure: Mutex<Option<TaskError>>,
}

impl Context {
    pub(crate) fn root(scheduler: Arc<Scheduler>, cancel: CancelToken) -> Self {
        Self {
            scheduler,
            cancel,
            scope: None,
        }
    }

    /// Derive the context of `task` from its caller's context
    pub(crate) fn enter(&self, task: Arc<Task>) -> Self {
        let output = Multiplexer::new(task.clone(), self.scheduler.reporters().clone());
        Self {
            scheduler: self.scheduler.clone(),
            cancel: self.cancel.clone(),
            scope: Some(Arc::new(TaskScope {
                task,
                next_span_start: Mutex::new((Utc::now(), Instant::now())),
                output: Arc::new(Mutex::new(output)),
                failure: Mutex::new(None),
            })),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The task this context belongs to, `None` for the root context
    pub fn task(&self) -> Option<&Arc<Task>> {
        self.scope.as_ref().map(|s| &s.task)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.cancel.deadline()
    }

    /// Fail with the interruption reason once the run is cancelled or past
    /// its deadline
    pub fn check(&self) -> Result<(), TaskError> {
        match self.cancel.err() {
            Some(reason) => Err(reason.into()),
            None => Ok(()),
        }
    }

    /// Sleep unless the run is cancelled or its deadline passes first
    pub fn sleep(&self, duration: Duration) -> Result<(), TaskError> {
        self.cancel.sleep(duration).map_err(TaskError::from)
    }

    /// Stdout of the current task
    pub fn stdout(&self) -> TaskWriter {
        self.writer(Stream::Stdout)
    }

    /// Stderr of the current task
    pub fn stderr(&self) -> TaskWriter {
        self.writer(Stream::Stderr)
    }

    fn writer(&self, stream: Stream) -> TaskWriter {
        match &self.scope {
            Some(scope) => TaskWriter::task(scope.output.clone(), stream),
            None => TaskWriter::process(stream),
        }
    }

    /// Run a single dependency
    pub fn dep(&self, dep: impl IntoRunnable) -> Result<(), TaskError> {
        self.deps([dep])
    }

    /// Run dependencies in parallel, exactly once each.
    ///
    /// All dependencies run to completion even if some fail; the failed ones
    /// are reported together as [`TaskError::Subtasks`].
    pub fn deps<I>(&self, deps: I) -> Result<(), TaskError>
    where
        I: IntoIterator,
        I::Item: IntoRunnable,
    {
        let subtasks = self.register(deps)?;
        self.run_subtasks(subtasks)
    }

    /// Run dependencies one after another, in the given order.
    ///
    /// A failure does not stop later dependencies from running.
    pub fn serial_deps<I>(&self, deps: I) -> Result<(), TaskError>
    where
        I: IntoIterator,
        I::Item: IntoRunnable,
    {
        let subtasks = self.register(deps)?;
        self.run_subtasks_sequential(subtasks)
    }

    fn register<I>(&self, deps: I) -> Result<Vec<Arc<Task>>, InvalidTask>
    where
        I: IntoIterator,
        I::Item: IntoRunnable,
    {
        let runnables = deps
            .into_iter()
            .map(IntoRunnable::into_runnable)
            .collect::<Result<Vec<Arc<dyn Runnable>>, _>>()?;
        Ok(self.scheduler.register(runnables))
    }

    fn run_subtasks(&self, subtasks: Vec<Arc<Task>>) -> Result<(), TaskError> {
        if subtasks.is_empty() {
            return Ok(());
        }
        self.close_span(Vec::new());
        self.report_dependencies(&subtasks, false);

        let (finished_tx, finished_rx) = bounded::<Arc<Task>>(subtasks.len());
        let mut failed = Vec::new();

        thread::scope(|s| {
            for subtask in &subtasks {
                let tx = finished_tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("task-{}", subtask.id()))
                    .spawn_scoped(s, move || {
                        subtask.run(self);
                        let _ = tx.send(subtask.clone());
                    });
                if let Err(e) = spawned {
                    log::warn!("Could not spawn thread for {}, running inline: {}", subtask, e);
                    subtask.run(self);
                    let _ = finished_tx.send(subtask.clone());
                }
            }
            drop(finished_tx);

            for _ in 0..subtasks.len() {
                match finished_rx.recv() {
                    Ok(subtask) if subtask.failed() => failed.push(subtask),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });

        self.close_span(subtasks);
        self.report_failures(failed)
    }

    fn run_subtasks_sequential(&self, subtasks: Vec<Arc<Task>>) -> Result<(), TaskError> {
        if subtasks.is_empty() {
            return Ok(());
        }
        self.close_span(Vec::new());
        self.report_dependencies(&subtasks, true);

        let mut failed = Vec::new();
        for subtask in &subtasks {
            subtask.run(self);
            if subtask.failed() {
                failed.push(subtask.clone());
            }
        }

        self.close_span(subtasks);
        self.report_failures(failed)
    }

    fn report_dependencies(&self, subtasks: &[Arc<Task>], sequential: bool) {
        if let Some(scope) = &self.scope {
            self.scheduler
                .reporters()
                .dependencies(&scope.task, subtasks, sequential);
        }
    }

    fn report_failures(&self, failed: Vec<Arc<Task>>) -> Result<(), TaskError> {
        if failed.is_empty() {
            return Ok(());
        }
        let err = TaskError::Subtasks(SubtasksFailure::new(failed));
        if let Some(scope) = &self.scope {
            let mut failure = scope.failure.lock().unwrap_or_else(|e| e.into_inner());
            failure.get_or_insert_with(|| err.clone());
        }
        Err(err)
    }

    /// Close the current span and start the next one
    pub(crate) fn close_span(&self, subtasks: Vec<Arc<Task>>) {
        let Some(scope) = &self.scope else {
            return;
        };
        let end = (Utc::now(), Instant::now());
        let mut next = scope
            .next_span_start
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let (start, started) = *next;
        scope.task.push_span(Span {
            start,
            end: end.0,
            subtasks,
            elapsed: end.1.saturating_duration_since(started),
        });
        *next = end;
    }

    pub(crate) fn flush_output(&self) {
        if let Some(scope) = &self.scope {
            scope
                .output
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .flush_all();
        }
    }

    pub(crate) fn take_failure(&self) -> Option<TaskError> {
        self.scope.as_ref().and_then(|scope| {
            scope
                .failure
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
        })
    }
}
