//! Reporters - event sinks for task lifecycle and captured output

mod plain;

pub use plain::PlainReporter;

use crate::core::{LogLine, Task};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Receives scheduler and output events.
///
/// Events arrive concurrently from every running task, so implementations
/// serialize their own state.
pub trait Reporter: Send + Sync {
    /// Task body is about to run
    fn started(&self, task: &Task);

    /// Task reached a terminal state; its error and spans are final
    fn finished(&self, task: &Task);

    /// `dependent` is about to wait for `dependees`
    fn dependencies(&self, dependent: &Task, dependees: &[Arc<Task>], sequential: bool);

    /// A complete line of task output
    fn output_line(&self, task: &Task, time: DateTime<Utc>, line: &LogLine);
}

/// Fan-out over the attached reporters, in attach order
#[derive(Clone)]
pub struct Reporters(Arc<[Arc<dyn Reporter>]>);

impl Reporters {
    pub fn new(reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self(reporters.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Reporter for Reporters {
    fn started(&self, task: &Task) {
        for r in self.0.iter() {
            r.started(task);
        }
    }

    fn finished(&self, task: &Task) {
        for r in self.0.iter() {
            r.finished(task);
        }
    }

    fn dependencies(&self, dependent: &Task, dependees: &[Arc<Task>], sequential: bool) {
        for r in self.0.iter() {
            r.dependencies(dependent, dependees, sequential);
        }
    }

    fn output_line(&self, task: &Task, time: DateTime<Utc>, line: &LogLine) {
        for r in self.0.iter() {
            r.output_line(task, time, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CancelToken, Context, Scheduler, TaskSpec};
    use std::sync::Mutex;

    /// Records every event as a short string
    #[derive(Default)]
    struct Recorder {
        tag: &'static str,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Reporter for Recorder {
        fn started(&self, task: &Task) {
            self.push(format!("started {}", task.name()));
        }

        fn finished(&self, task: &Task) {
            self.push(format!("finished {} {}", task.name(), task.state()));
        }

        fn dependencies(&self, dependent: &Task, dependees: &[Arc<Task>], sequential: bool) {
            let names: Vec<&str> = dependees.iter().map(|t| t.name()).collect();
            self.push(format!(
                "deps {} -> {} ({})",
                dependent.name(),
                names.join(","),
                sequential
            ));
        }

        fn output_line(&self, task: &Task, _time: DateTime<Utc>, line: &LogLine) {
            self.push(format!("line {} {:?}", task.name(), line.line));
        }
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}: {}", self.tag, event));
        }
    }

    #[test]
    fn test_events_fan_out_in_attach_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(Recorder {
            tag: "a",
            events: events.clone(),
        });
        let second = Arc::new(Recorder {
            tag: "b",
            events: events.clone(),
        });
        let scheduler = Arc::new(Scheduler::new(vec![first as Arc<dyn Reporter>, second]));

        scheduler
            .context(CancelToken::new())
            .dep(TaskSpec::new("outer", |ctx: &Context| -> anyhow::Result<()> {
                ctx.serial_deps([TaskSpec::new("inner", || {})])?;
                Ok(())
            }))
            .unwrap();

        let got = events.lock().unwrap().clone();
        assert_eq!(
            got,
            vec![
                "a: started outer",
                "b: started outer",
                "a: deps outer -> inner (true)",
                "b: deps outer -> inner (true)",
                "a: started inner",
                "b: started inner",
                "a: finished inner succeeded",
                "b: finished inner succeeded",
                "a: finished outer succeeded",
                "b: finished outer succeeded",
            ]
        );
    }

    #[test]
    fn test_root_dependencies_are_not_reported() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::new(Recorder {
            tag: "r",
            events: events.clone(),
        });
        let scheduler = Arc::new(Scheduler::new(vec![recorder as Arc<dyn Reporter>]));
        scheduler
            .context(CancelToken::new())
            .dep(TaskSpec::new("solo", || {}))
            .unwrap();

        let got = events.lock().unwrap().clone();
        assert_eq!(got, vec!["r: started solo", "r: finished solo succeeded"]);
    }
}
