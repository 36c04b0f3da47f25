use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tusk::core::install_panic_hook;
use tusk::{
    CancelToken, Context, Identity, Interrupted, Runnable, Scheduler, TaskError, TaskSpec,
    TaskState,
};

fn scheduler() -> Arc<Scheduler> {
    Arc::new(Scheduler::new(Vec::new()))
}

fn counting(name: &'static str, counter: &Arc<AtomicUsize>) -> TaskSpec {
    let counter = counter.clone();
    TaskSpec::new(name, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_exactly_once_with_concurrent_callers() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    thread::scope(|s| {
        for _ in 0..8 {
            let ctx = scheduler.context(CancelToken::new());
            let counter = counter.clone();
            let barrier = barrier.clone();
            s.spawn(move || {
                barrier.wait();
                let slow = TaskSpec::new("shared", move || {
                    thread::sleep(Duration::from_millis(20));
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                ctx.dep(slow).unwrap();
            });
        }
    });

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    let tasks = scheduler.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].state(), TaskState::Succeeded);
}

#[test]
fn test_diamond_dependency_runs_shared_task_once() {
    let scheduler = scheduler();
    let d = Arc::new(AtomicUsize::new(0));

    let middle = |name: &'static str| {
        let d = d.clone();
        TaskSpec::new(name, move |ctx: &Context| -> anyhow::Result<()> {
            ctx.dep(counting("d", &d))?;
            Ok(())
        })
    };
    let a = {
        let b = middle("b");
        let c = middle("c");
        TaskSpec::new("a", move |ctx: &Context| -> anyhow::Result<()> {
            ctx.deps([b.clone(), c.clone()])?;
            Ok(())
        })
    };

    scheduler.context(CancelToken::new()).dep(a).unwrap();

    assert_eq!(d.load(Ordering::SeqCst), 1);
    let names: Vec<String> = scheduler
        .tasks()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(names.len(), 4);
    assert!(scheduler.tasks().iter().all(|t| t.state() == TaskState::Succeeded));
}

fn fails_after(name: &'static str, delay: u64, msg: &'static str) -> TaskSpec {
    TaskSpec::new(name, move || -> anyhow::Result<()> {
        thread::sleep(Duration::from_millis(delay));
        anyhow::bail!(msg)
    })
}

#[test]
fn test_parallel_failures_ordered_by_id() {
    let scheduler = scheduler();
    let err = scheduler
        .context(CancelToken::new())
        .deps([
            // f1 finishes last, f3 first
            fails_after("f1", 60, "x"),
            TaskSpec::new("f2", || {}),
            fails_after("f3", 0, "y"),
        ])
        .unwrap_err();

    let failure = err.subtasks().expect("aggregate failure");
    let names: Vec<&str> = failure.tasks().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["f1", "f3"]);
    assert_eq!(failure.tasks()[0].error().unwrap().to_string(), "x");
    assert_eq!(failure.tasks()[1].error().unwrap().to_string(), "y");
    assert_eq!(err.to_string(), "Failed subtasks: #0000 f1, #0002 f3");
}

#[test]
fn test_sequential_dependencies_do_not_short_circuit() {
    let scheduler = scheduler();
    let order = Arc::new(Mutex::new(Vec::new()));
    let step = |name: &'static str, fail: bool| {
        let order = order.clone();
        TaskSpec::new(name, move || -> anyhow::Result<()> {
            order.lock().unwrap().push(name);
            if fail {
                anyhow::bail!("{} failed", name);
            }
            Ok(())
        })
    };

    let err = scheduler
        .context(CancelToken::new())
        .serial_deps([step("f1", true), step("f2", false), step("f3", true)])
        .unwrap_err();

    assert_eq!(*order.lock().unwrap(), vec!["f1", "f2", "f3"]);
    let names: Vec<&str> = err
        .subtasks()
        .unwrap()
        .tasks()
        .iter()
        .map(|t| t.name())
        .collect();
    assert_eq!(names, vec!["f1", "f3"]);
}

#[test]
fn test_registry_returns_identical_task() {
    let scheduler = scheduler();
    let first: Arc<dyn Runnable> = Arc::new(TaskSpec::new("same", || {}).validate().unwrap());
    let second: Arc<dyn Runnable> = Arc::new(TaskSpec::new("same", || {}).validate().unwrap());

    let a = scheduler.register(vec![first]);
    let b = scheduler.register(vec![second]);
    assert!(Arc::ptr_eq(&a[0], &b[0]));
}

/// Parameterised dependency, deduplicated by its target
struct Compile {
    target: &'static str,
    runs: Arc<AtomicUsize>,
}

impl Runnable for Compile {
    fn name(&self) -> String {
        format!("compile({})", self.target)
    }

    fn identity(&self) -> Identity {
        Identity::keyed("compile", self.target)
    }

    fn run(&self, _ctx: &Context) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_keyed_dependencies() {
    let scheduler = scheduler();
    let runs = Arc::new(AtomicUsize::new(0));
    let compile = |target| Compile {
        target,
        runs: runs.clone(),
    };

    scheduler
        .context(CancelToken::new())
        .deps([
            compile("linux"),
            compile("darwin"),
            compile("linux"),
            compile("windows"),
        ])
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    let names: Vec<String> = scheduler
        .tasks()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["compile(linux)", "compile(darwin)", "compile(windows)"]
    );
}

#[test]
fn test_cancellation_reaches_running_tasks() {
    let scheduler = scheduler();
    let cancel = CancelToken::new();
    let ctx = scheduler.context(cancel.clone());

    let started = Instant::now();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();
    });

    let err = ctx
        .dep(TaskSpec::new("long", |ctx: &Context| -> anyhow::Result<()> {
            ctx.sleep(Duration::from_secs(30))?;
            Ok(())
        }))
        .unwrap_err();
    canceller.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    let task = &err.subtasks().unwrap().tasks()[0];
    assert!(matches!(
        task.error(),
        Some(TaskError::Interrupted(Interrupted::Cancelled))
    ));
}

#[test]
fn test_panicking_task_is_recorded() {
    let scheduler = scheduler();
    let err = scheduler
        .context(CancelToken::new())
        .dep(TaskSpec::new("explode", || -> anyhow::Result<()> { panic!("kaboom") }))
        .unwrap_err();

    let task = &err.subtasks().unwrap().tasks()[0];
    assert_eq!(task.state(), TaskState::Failed);
    assert_eq!(task.error().unwrap().to_string(), "panic: kaboom");
}

#[test]
fn test_panic_with_error_payload_keeps_error() {
    install_panic_hook();
    let scheduler = scheduler();
    let err = scheduler
        .context(CancelToken::new())
        .dep(TaskSpec::new("disk", || -> anyhow::Result<()> {
            std::panic::panic_any(anyhow::anyhow!("disk full"))
        }))
        .unwrap_err();

    let task = &err.subtasks().unwrap().tasks()[0];
    assert_eq!(task.state(), TaskState::Failed);
    assert!(matches!(task.error(), Some(TaskError::Failed(_))));
    assert_eq!(task.error().unwrap().to_string(), "disk full");
}

#[test]
fn test_panic_location_recorded_with_hook() {
    install_panic_hook();
    let scheduler = scheduler();
    let err = scheduler
        .context(CancelToken::new())
        .dep(TaskSpec::new("explode", || -> anyhow::Result<()> { panic!("kaboom") }))
        .unwrap_err();

    let error = err.subtasks().unwrap().tasks()[0].error().unwrap();
    assert_eq!(error.to_string(), "panic: kaboom");
    let location = error.panic_location().unwrap();
    assert!(location.starts_with("tests/integration_test.rs:"), "{}", location);
}

#[test]
fn test_invalid_task_fails_at_registration() {
    let scheduler = scheduler();
    let ran = Arc::new(AtomicUsize::new(0));
    let err = scheduler
        .context(CancelToken::new())
        .deps([counting("fine", &ran), counting("not fine", &ran)])
        .unwrap_err();

    assert!(matches!(err, TaskError::InvalidTask(_)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(scheduler.tasks().is_empty());
}
