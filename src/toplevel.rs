//! Top-level driver - command-line entry point of a build program
//!
//! A build program declares its targets as a [`Program`] and hands it to
//! [`main`]:
//!
//! ```no_run
//! use tusk::toplevel::{self, Program, Target};
//! use tusk::TaskSpec;
//!
//! fn build() {
//!     println!("building");
//! }
//!
//! fn main() {
//!     let program = Program::new("build")
//!         .target(Target::new(TaskSpec::new("build", build)).unwrap())
//!         .default_target("build");
//!     toplevel::main(program)
//! }
//! ```

use crate::config::{Cli, Settings};
use crate::core::{install_panic_hook, CancelToken, IntoRunnable, Runnable, Scheduler, Task};
use crate::error::{plural, InvalidTask};
use crate::failure::format_failures;
use crate::report::{PlainReporter, Reporter};
use crate::trace::write_trace;
use crate::ui::try_terminal_reporter;
use anyhow::Result;
use clap::Parser;
use std::ffi::OsString;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

const COLUMN_PADDING: usize = 4;

/// One build target
#[derive(Clone)]
pub struct Target {
    name: String,
    runnable: Arc<dyn Runnable>,
    synopsis: String,
    comment: String,
}

impl Target {
    /// Target running `runnable`, named after it
    pub fn new(runnable: impl IntoRunnable) -> Result<Self, InvalidTask> {
        let runnable = runnable.into_runnable()?;
        Ok(Self {
            name: runnable.name(),
            runnable,
            synopsis: String::new(),
            comment: String::new(),
        })
    }

    /// One-line summary shown in the target list
    pub fn synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.synopsis = synopsis.into();
        self
    }

    /// Full description shown by `-h <target>`
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A build program: its targets and how to present them
#[derive(Clone)]
pub struct Program {
    binary_name: String,
    description: String,
    module: Option<String>,
    default_target: Option<String>,
    targets: Vec<Target>,
}

impl Program {
    pub fn new(binary_name: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            description: String::new(),
            module: None,
            default_target: None,
            targets: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Prefix trimmed from task names in reports
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Target run when none is given on the command line
    pub fn default_target(mut self, name: impl Into<String>) -> Self {
        self.default_target = Some(name.into());
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Case-insensitive target lookup
    pub fn find_target(&self, name: &str) -> Option<&Target> {
        let needle = name.to_lowercase();
        self.targets.iter().find(|t| t.name.to_lowercase() == needle)
    }

    fn sorted_targets(&self) -> Vec<&Target> {
        let mut targets: Vec<&Target> = self.targets.iter().collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        targets
    }
}

/// Run the program with the process arguments and exit
pub fn main(program: Program) -> ! {
    let code = run(&program, std::env::args_os());
    std::process::exit(code)
}

/// Run the program with `args` (including the binary name), returning the
/// exit code
pub fn run<I, T>(program: &Program, args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    run_with(
        program,
        args,
        Settings::from_env(),
        &mut io::stdout(),
        select_reporter,
    )
}

/// Like [`run`], with explicit environment settings, output and reporter
pub fn run_with<I, T, F>(
    program: &Program,
    args: I,
    env: Settings,
    out: &mut dyn Write,
    make_reporter: F,
) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnOnce(&Settings) -> Arc<dyn Reporter>,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return 2;
        }
    };
    let settings = env.merge(&cli);
    init_logging(settings.verbose);
    install_panic_hook();

    match dispatch(program, &cli.targets, &settings, out, make_reporter) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:#}", e);
            1
        }
    }
}

/// Plain reporter in verbose mode or without a terminal, the live status
/// line otherwise
pub fn select_reporter(settings: &Settings) -> Arc<dyn Reporter> {
    if !settings.verbose {
        match try_terminal_reporter() {
            Ok(reporter) => return Arc::new(reporter),
            Err(e) => log::debug!("Falling back to plain output: {}", e),
        }
    }
    Arc::new(PlainReporter::stdout())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    // Already initialised when the driver runs more than once per process
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

fn dispatch<F>(
    program: &Program,
    args: &[String],
    settings: &Settings,
    out: &mut dyn Write,
    make_reporter: F,
) -> Result<i32>
where
    F: FnOnce(&Settings) -> Arc<dyn Reporter>,
{
    if settings.help && args.is_empty() {
        print_usage(program, out)?;
        return Ok(0);
    }
    if settings.list {
        list_targets(program, out)?;
        return Ok(0);
    }

    let names: Vec<String> = match (args.is_empty(), &program.default_target) {
        (false, _) => args.to_vec(),
        (true, Some(default)) if !settings.ignore_default => vec![default.clone()],
        (true, _) => {
            list_targets(program, out)?;
            return Ok(0);
        }
    };

    let unknown: Vec<&str> = names
        .iter()
        .filter(|n| program.find_target(n).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        eprintln!(
            "Unknown {} specified: {}",
            plural("target", unknown.len()),
            unknown.join(", ")
        );
        return Ok(2);
    }

    let targets: Vec<&Target> = names
        .iter()
        .filter_map(|n| program.find_target(n))
        .collect();

    if settings.help {
        let target = targets[0];
        write!(out, "{} {}:\n\n", program.binary_name, target.name)?;
        if !target.comment.is_empty() {
            write!(out, "{}\n\n", target.comment)?;
        }
        return Ok(0);
    }

    let reporter = make_reporter(settings);
    let scheduler = Arc::new(match &program.module {
        Some(module) => Scheduler::with_module(vec![reporter], module.clone()),
        None => Scheduler::new(vec![reporter]),
    });
    let cancel = match settings.timeout {
        Some(timeout) => CancelToken::with_timeout(timeout),
        None => CancelToken::new(),
    };

    let runnables = targets.iter().map(|t| t.runnable.clone()).collect();
    let tasks = scheduler.register(runnables);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_targets(&scheduler, &tasks, cancel, &mut *out)
    }));
    let mut code = match outcome {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => return Err(e),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "Box<dyn Any>".to_string());
            writeln!(out, "Unexpected error: {}", msg)?;
            1
        }
    };

    if let Some(path) = &settings.trace {
        if let Err(e) = write_trace(path, &scheduler.tasks()) {
            eprintln!("{:#}", e);
            code = 1;
        }
    }
    Ok(code)
}

/// Run targets in order, stopping at the first failure
fn run_targets(
    scheduler: &Arc<Scheduler>,
    tasks: &[Arc<Task>],
    cancel: CancelToken,
    out: &mut dyn Write,
) -> Result<i32> {
    let ctx = scheduler.context(cancel);
    for task in tasks {
        task.run(&ctx);
        if task.failed() {
            out.write_all(format_failures(task).as_bytes())?;
            out.flush()?;
            return Ok(1);
        }
    }
    Ok(0)
}

fn print_usage(program: &Program, out: &mut dyn Write) -> io::Result<()> {
    write!(
        out,
        "{} [options] [target]

Commands:
  -l    list targets in this binary
  -h    show this help

Options:
  -h    show description of a target
  -t <string>
        timeout in duration parsable format (e.g. 5m30s)
  -v    show verbose output when running targets
  --trace <file>
        trace task execution and save to the given file in Chrome trace_event format
",
        program.binary_name
    )
}

fn list_targets(program: &Program, out: &mut dyn Write) -> io::Result<()> {
    if !program.description.is_empty() {
        write!(out, "{}\n\n", program.description)?;
    }

    writeln!(out, "Targets:")?;
    let default = program.default_target.as_deref();
    let rows: Vec<(String, &str)> = program
        .sorted_targets()
        .into_iter()
        .map(|t| {
            let mark = if Some(t.name.as_str()) == default { "*" } else { "" };
            (format!("  {}{}", t.name, mark), t.synopsis.as_str())
        })
        .collect();
    let width = rows.iter().map(|(name, _)| name.chars().count()).max().unwrap_or(0);
    for (name, synopsis) in rows {
        let line = format!("{:<width$}{}", name, synopsis, width = width + COLUMN_PADDING);
        writeln!(out, "{}", line.trim_end())?;
    }

    if default.is_some() {
        writeln!(out, "\n* default target")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Context, TaskSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn quiet(_: &Settings) -> Arc<dyn Reporter> {
        Arc::new(PlainReporter::new(io::sink()))
    }

    fn invoke(program: &Program, args: &[&str], env: Settings) -> (i32, String) {
        let mut out = Vec::new();
        let mut argv = vec!["build"];
        argv.extend_from_slice(args);
        let code = run_with(program, argv, env, &mut out, quiet);
        (code, String::from_utf8(out).unwrap())
    }

    fn program(counter: Arc<AtomicUsize>) -> Program {
        let count = counter.clone();
        Program::new("build")
            .description("Sample build")
            .target(
                Target::new(TaskSpec::new("compile", move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap()
                .synopsis("Compile the sources")
                .comment("Compile every source file."),
            )
            .target(
                Target::new(TaskSpec::new("lint", || -> anyhow::Result<()> {
                    anyhow::bail!("style violations")
                }))
                .unwrap()
                .synopsis("Check style"),
            )
            .target(
                Target::new(TaskSpec::new("wait", |ctx: &Context| -> anyhow::Result<()> {
                    ctx.sleep(Duration::from_secs(30))?;
                    Ok(())
                }))
                .unwrap(),
            )
            .default_target("compile")
    }

    #[test]
    fn test_list_targets() {
        let (code, out) = invoke(&program(Arc::default()), &["-l"], Settings::default());
        assert_eq!(code, 0);
        assert_eq!(
            out,
            "Sample build\n\n\
             Targets:\n\
             \x20 compile*    Compile the sources\n\
             \x20 lint        Check style\n\
             \x20 wait\n\
             \n* default target\n"
        );
    }

    #[test]
    fn test_default_target_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (code, _) = invoke(&program(counter.clone()), &[], Settings::default());
        assert_eq!(code, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ignored_default_lists() {
        let counter = Arc::new(AtomicUsize::new(0));
        let env = Settings {
            ignore_default: true,
            ..Settings::default()
        };
        let (code, out) = invoke(&program(counter.clone()), &[], env);
        assert_eq!(code, 0);
        assert!(out.contains("Targets:"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_targets_match_case_insensitively() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (code, _) = invoke(&program(counter.clone()), &["COMPILE", "Compile"], Settings::default());
        assert_eq!(code, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_targets_exit_2() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (code, _) = invoke(&program(counter.clone()), &["compile", "nope"], Settings::default());
        assert_eq!(code, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bad_flag_exit_2() {
        let (code, _) = invoke(&program(Arc::default()), &["-t", "later"], Settings::default());
        assert_eq!(code, 2);
    }

    #[test]
    fn test_help() {
        let (code, out) = invoke(&program(Arc::default()), &["-h"], Settings::default());
        assert_eq!(code, 0);
        assert!(out.starts_with("build [options] [target]\n"));

        let (code, out) = invoke(&program(Arc::default()), &["-h", "compile"], Settings::default());
        assert_eq!(code, 0);
        assert_eq!(out, "build compile:\n\nCompile every source file.\n\n");
    }

    #[test]
    fn test_failure_stops_run_and_prints_tree() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (code, out) = invoke(&program(counter.clone()), &["lint", "compile"], Settings::default());
        assert_eq!(code, 1);
        assert!(out.contains("#0000 lint failed: style violations"), "{}", out);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_target_reported_in_failure_tree() {
        let program = Program::new("build").target(
            Target::new(TaskSpec::new("explode", || -> anyhow::Result<()> {
                panic!("kaboom")
            }))
            .unwrap(),
        );

        let (code, out) = invoke(&program, &["explode"], Settings::default());
        assert_eq!(code, 1);
        assert!(
            out.contains("#0000 explode failed: panic: kaboom @ src/toplevel.rs:"),
            "{}",
            out
        );
        assert!(!out.contains("Unexpected error"));
    }

    #[test]
    fn test_timeout_interrupts_sleeping_target() {
        let started = Instant::now();
        let (code, out) = invoke(&program(Arc::default()), &["-t", "50ms", "wait"], Settings::default());
        assert_eq!(code, 1);
        assert!(out.contains("context deadline exceeded"), "{}", out);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_trace_written_even_on_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.json");
        let (code, _) = invoke(
            &program(Arc::default()),
            &["--trace", path.to_str().unwrap(), "lint"],
            Settings::default(),
        );
        assert_eq!(code, 1);
        let events: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(events[0]["args"]["name"], "#0000 lint");
    }

    #[test]
    fn test_unwritable_trace_exit_1() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("trace.json");
        let (code, _) = invoke(
            &program(Arc::default()),
            &["--trace", path.to_str().unwrap(), "compile"],
            Settings::default(),
        );
        assert_eq!(code, 1);
    }

    #[test]
    fn test_module_trims_task_names() {
        let program = Program::new("build")
            .module("ci")
            .target(
                Target::new(TaskSpec::new("check", || -> anyhow::Result<()> {
                    anyhow::bail!("red")
                }).in_namespace("ci"))
                .unwrap(),
            );
        assert!(program.find_target("CI::check").is_some());
        let (code, out) = invoke(&program, &["ci::check"], Settings::default());
        assert_eq!(code, 1);
        assert!(out.contains("#0000 check failed: red"), "{}", out);
    }
}
