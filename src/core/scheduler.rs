//! Task Scheduler - shared state of one run

use super::cancel::CancelToken;
use super::context::Context;
use super::registry::Registry;
use super::task::{Runnable, Task};
use crate::report::{Reporter, Reporters};
use std::sync::Arc;

/// Owns the registry and the reporters of a run.
///
/// There is no global scheduler; every entry point creates one and hands
/// out contexts derived from it.
pub struct Scheduler {
    registry: Registry,
    reporters: Reporters,
}

impl Scheduler {
    /// Create a scheduler that reports to `reporters`
    pub fn new(reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self {
            registry: Registry::new(),
            reporters: Reporters::new(reporters),
        }
    }

    /// Like [`Scheduler::new`], trimming `module::` off displayed task names
    pub fn with_module(reporters: Vec<Arc<dyn Reporter>>, module: impl Into<String>) -> Self {
        Self {
            registry: Registry::with_module(module),
            reporters: Reporters::new(reporters),
        }
    }

    /// Root context for running targets
    pub fn context(self: &Arc<Self>, cancel: CancelToken) -> Context {
        Context::root(self.clone(), cancel)
    }

    pub fn register(&self, runnables: Vec<Arc<dyn Runnable>>) -> Vec<Arc<Task>> {
        self.registry.register(runnables)
    }

    /// Every task created so far, in ID order
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.registry.tasks()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn reporters(&self) -> &Reporters {
        &self.reporters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskSpec;
    use crate::error::TaskError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_separate_schedulers_are_isolated() {
        let count = Arc::new(AtomicUsize::new(0));
        let spec = || {
            let count = count.clone();
            TaskSpec::new("count", move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        let first = Arc::new(Scheduler::new(Vec::new()));
        let second = Arc::new(Scheduler::new(Vec::new()));
        first.context(CancelToken::new()).dep(spec()).unwrap();
        first.context(CancelToken::new()).dep(spec()).unwrap();
        second.context(CancelToken::new()).dep(spec()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(first.tasks().len(), 1);
        assert_eq!(second.tasks().len(), 1);
    }

    #[test]
    fn test_failed_target_is_aggregated() {
        let scheduler = Arc::new(Scheduler::new(Vec::new()));
        let err = scheduler
            .context(CancelToken::new())
            .deps([
                TaskSpec::new("ok", || {}),
                TaskSpec::new("bad", || -> anyhow::Result<()> { anyhow::bail!("bad") }),
            ])
            .unwrap_err();

        match err {
            TaskError::Subtasks(failure) => {
                assert_eq!(failure.tasks().len(), 1);
                assert_eq!(failure.tasks()[0].name(), "bad");
                assert_eq!(failure.to_string(), "Failed subtask: #0001 bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_module_names_are_trimmed() {
        let scheduler = Arc::new(Scheduler::with_module(Vec::new(), "build"));
        scheduler
            .context(CancelToken::new())
            .dep(TaskSpec::new("lint", || {}).in_namespace("build"))
            .unwrap();
        assert_eq!(scheduler.tasks()[0].name(), "lint");
    }
}
