//! Error types shared by the scheduler, the adapter and the driver

use crate::core::Task;
use std::any::Any;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use thiserror::Error;

/// Terminal error of a task.
///
/// Cloneable so that every caller joining on a task observes the same value.
#[derive(Debug, Error, Clone)]
pub enum TaskError {
    /// The body returned an error
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),

    /// The body panicked with a non-error payload
    #[error("panic: {message}")]
    Panicked {
        message: String,
        /// Source location of the panic, known once the task panic hook is
        /// installed
        location: Option<String>,
    },

    /// One or more dependencies failed
    #[error(transparent)]
    Subtasks(#[from] SubtasksFailure),

    /// The body observed cancellation or an expired deadline
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// A dependency could not be turned into a runnable
    #[error(transparent)]
    InvalidTask(#[from] InvalidTask),
}

impl TaskError {
    /// Failed dependencies, if this is an aggregate failure
    pub fn subtasks(&self) -> Option<&SubtasksFailure> {
        match self {
            Self::Subtasks(failure) => Some(failure),
            _ => None,
        }
    }

    /// Error values raised with `panic_any` are kept as they are; anything
    /// else becomes [`TaskError::Panicked`].
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>, location: Option<String>) -> Self {
        let payload = match payload.downcast::<TaskError>() {
            Ok(err) => return *err,
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<anyhow::Error>() {
            Ok(err) => return Self::from(*err),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<Box<dyn std::error::Error + Send + Sync>>() {
            Ok(err) => return Self::from(anyhow::anyhow!(*err)),
            Err(payload) => payload,
        };

        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            msg.to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        Self::Panicked { message, location }
    }

    /// Where the body panicked, if known
    pub fn panic_location(&self) -> Option<&str> {
        match self {
            Self::Panicked { location, .. } => location.as_deref(),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TaskError>() {
            Ok(err) => err,
            Err(err) => Self::Failed(Arc::new(err)),
        }
    }
}

/// Aggregate failure of a dependency join, failed tasks sorted by ID.
///
/// A task requested more than once in the same join is listed once.
#[derive(Debug, Clone)]
pub struct SubtasksFailure(Vec<Arc<Task>>);

impl SubtasksFailure {
    pub(crate) fn new(mut failed: Vec<Arc<Task>>) -> Self {
        failed.sort_by_key(|t| t.id());
        failed.dedup_by_key(|t| t.id());
        Self(failed)
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.0
    }
}

impl fmt::Display for SubtasksFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        write!(
            f,
            "Failed {}: {}",
            plural("subtask", self.0.len()),
            ids.join(", ")
        )
    }
}

impl std::error::Error for SubtasksFailure {}

/// Reason a cooperative check stopped a task
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A callable that was rejected at registration
#[derive(Debug, Error, Clone)]
#[error("Invalid task {name:?} of shape {shape}: {reason} @ {location}")]
pub struct InvalidTask {
    pub name: String,
    pub shape: String,
    pub reason: String,
    pub location: String,
}

impl InvalidTask {
    pub(crate) fn new(
        name: &str,
        shape: String,
        reason: impl Into<String>,
        location: &Location<'_>,
    ) -> Self {
        Self {
            name: name.to_string(),
            shape,
            reason: reason.into(),
            location: location.to_string(),
        }
    }
}

pub(crate) fn plural(name: &str, count: usize) -> String {
    if count == 1 {
        name.to_string()
    } else {
        format!("{}s", name)
    }
}
