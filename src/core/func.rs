//! Callable adapter - turns plain functions and closures into runnables
//!
//! Accepted shapes:
//!
//! ```text
//! fn()
//! fn() -> anyhow::Result<()>
//! fn(&Context)
//! fn(&Context) -> anyhow::Result<()>
//! ```
//!
//! Each of them may also be placed in a namespace, which prefixes the task
//! name (`docker::build`).

use super::context::Context;
use super::task::Runnable;
use crate::error::InvalidTask;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

type PlainFn = dyn Fn() + Send + Sync;
type FallibleFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;
type ContextFn = dyn Fn(&Context) + Send + Sync;
type ContextFallibleFn = dyn Fn(&Context) -> anyhow::Result<()> + Send + Sync;

/// One of the accepted callable shapes
#[derive(Clone)]
pub enum TaskFn {
    Plain(Arc<PlainFn>),
    Fallible(Arc<FallibleFn>),
    WithContext(Arc<ContextFn>),
    WithContextFallible(Arc<ContextFallibleFn>),
}

impl TaskFn {
    /// Signature of the callable, for error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Plain(_) => "fn()",
            Self::Fallible(_) => "fn() -> Result",
            Self::WithContext(_) => "fn(&Context)",
            Self::WithContextFallible(_) => "fn(&Context) -> Result",
        }
    }

    fn call(&self, ctx: &Context) -> anyhow::Result<()> {
        match self {
            Self::Plain(f) => {
                f();
                Ok(())
            }
            Self::Fallible(f) => f(),
            Self::WithContext(f) => {
                f(ctx);
                Ok(())
            }
            Self::WithContextFallible(f) => f(ctx),
        }
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskFn({})", self.shape())
    }
}

/// Callables convertible to a [`TaskFn`]. The marker type parameter keeps
/// the implementations for the different shapes apart.
pub trait TaskShape<Marker> {
    fn into_task_fn(self) -> TaskFn;
}

#[doc(hidden)]
pub struct PlainMarker;
#[doc(hidden)]
pub struct FallibleMarker;
#[doc(hidden)]
pub struct ContextMarker;
#[doc(hidden)]
pub struct ContextFallibleMarker;

impl<F> TaskShape<PlainMarker> for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn into_task_fn(self) -> TaskFn {
        TaskFn::Plain(Arc::new(self))
    }
}

impl<F> TaskShape<FallibleMarker> for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn into_task_fn(self) -> TaskFn {
        TaskFn::Fallible(Arc::new(self))
    }
}

impl<F> TaskShape<ContextMarker> for F
where
    F: Fn(&Context) + Send + Sync + 'static,
{
    fn into_task_fn(self) -> TaskFn {
        TaskFn::WithContext(Arc::new(self))
    }
}

impl<F> TaskShape<ContextFallibleMarker> for F
where
    F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn into_task_fn(self) -> TaskFn {
        TaskFn::WithContextFallible(Arc::new(self))
    }
}

/// A named callable, not yet validated
#[derive(Clone)]
pub struct TaskSpec {
    name: String,
    namespace: Option<String>,
    func: TaskFn,
    location: &'static Location<'static>,
}

impl TaskSpec {
    /// Wrap `func` under `name`. The call site is recorded for error
    /// reporting.
    #[track_caller]
    pub fn new<M>(name: impl Into<String>, func: impl TaskShape<M>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            func: func.into_task_fn(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn from_fn(name: impl Into<String>, func: TaskFn) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            func,
            location: Location::caller(),
        }
    }

    /// Place the task in a namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Full task name, `namespace::name` for namespaced tasks
    pub fn name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}::{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    pub fn shape(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}::{}", ns, self.func.shape()),
            None => self.func.shape().to_string(),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Check the declared names and produce a runnable
    pub fn validate(self) -> Result<FuncRunnable, InvalidTask> {
        let invalid = |reason: &str| {
            InvalidTask::new(&self.name(), self.shape(), reason, self.location)
        };

        if self.name.is_empty() {
            return Err(invalid("task name must not be empty"));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(invalid("task name must not contain whitespace"));
        }
        if let Some(ns) = &self.namespace {
            if ns.is_empty() {
                return Err(invalid("namespace must not be empty"));
            }
            if ns.chars().any(|c| c.is_whitespace() || c == ':') {
                return Err(invalid("namespace must not contain whitespace or ':'"));
            }
        }

        Ok(FuncRunnable {
            name: self.name(),
            func: self.func,
        })
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name())
            .field("shape", &self.func.shape())
            .field("location", &self.location.to_string())
            .finish()
    }
}

/// Validated callable
#[derive(Clone, Debug)]
pub struct FuncRunnable {
    name: String,
    func: TaskFn,
}

impl Runnable for FuncRunnable {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        self.func.call(ctx)
    }
}

/// Anything that can be declared as a dependency
pub trait IntoRunnable {
    fn into_runnable(self) -> Result<Arc<dyn Runnable>, InvalidTask>;
}

impl<R: Runnable + 'static> IntoRunnable for R {
    fn into_runnable(self) -> Result<Arc<dyn Runnable>, InvalidTask> {
        Ok(Arc::new(self))
    }
}

impl IntoRunnable for TaskSpec {
    fn into_runnable(self) -> Result<Arc<dyn Runnable>, InvalidTask> {
        Ok(Arc::new(self.validate()?))
    }
}
