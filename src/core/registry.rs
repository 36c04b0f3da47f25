//! Task registry - maps identities to their single task instance

use super::identity::Identity;
use super::task::{Runnable, Task, TaskId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    by_identity: HashMap<Identity, Arc<Task>>,
    // Every task ever created, indexed by ID
    all: Vec<Arc<Task>>,
}

/// Registers runnables for execution.
///
/// Registering a runnable whose identity is already known returns the
/// existing task, so each identity runs at most once for the life of the
/// registry. Tasks are never removed.
#[derive(Default)]
pub struct Registry {
    module: Option<String>,
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that trims `module::` off task names for display
    pub fn with_module(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            inner: Mutex::default(),
        }
    }

    /// One task per input runnable, in input order
    pub fn register<I>(&self, runnables: I) -> Vec<Arc<Task>>
    where
        I: IntoIterator<Item = Arc<dyn Runnable>>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        runnables
            .into_iter()
            .map(|runnable| {
                let identity = runnable.identity();
                if let Some(task) = inner.by_identity.get(&identity) {
                    return task.clone();
                }

                let id: TaskId = inner.all.len();
                let name = self.display_name(&runnable.name());
                let task = Arc::new(Task::new(id, name, identity.clone(), runnable));
                log::debug!("Registered task {}", task);

                inner.by_identity.insert(identity, task.clone());
                inner.all.push(task.clone());
                task
            })
            .collect()
    }

    /// All tasks created so far, in ID order
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .all
            .clone()
    }

    pub fn get(&self, identity: &Identity) -> Option<Arc<Task>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_identity
            .get(identity)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn display_name(&self, name: &str) -> String {
        match &self.module {
            Some(module) => name
                .strip_prefix(module.as_str())
                .and_then(|rest| rest.strip_prefix("::"))
                .unwrap_or(name)
                .to_string(),
            None => name.to_string(),
        }
    }
}
