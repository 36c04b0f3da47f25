//! UI layer - live status line for interactive terminals
//!
//! Task output is printed above a single status line that lists the
//! unfinished tasks. The status line is redrawn after every event.

mod deps;
mod resize;
mod status;

use crate::core::{LogLine, Stream, Task, TaskId};
use crate::report::Reporter;
use chrono::{DateTime, Utc};
use crossterm::{
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
    tty::IsTty,
};
use deps::DepSet;
use status::{format_blocked_tasks, format_running_tasks, width};
use std::collections::{BTreeSet, HashMap};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Why the terminal reporter cannot be used
#[derive(Debug, Error)]
pub enum TerminalUnavailable {
    #[error("stdout is not a terminal")]
    NotATerminal,

    #[error("terminal reporter is only available under Unix")]
    Unsupported,

    #[error("terminal query failed: {0}")]
    Io(#[from] io::Error),
}

struct State<W> {
    cols: u16,
    unfinished: HashMap<TaskId, String>,
    deps: DepSet,
    out: W,
}

/// Reporter drawing a live status line at the bottom of the terminal
pub struct TerminalReporter<W: Write + Send> {
    state: Arc<Mutex<State<W>>>,
}

/// Terminal reporter on stdout, if stdout is an interactive terminal
pub fn try_terminal_reporter() -> Result<TerminalReporter<io::Stdout>, TerminalUnavailable> {
    TerminalReporter::stdout()
}

impl TerminalReporter<io::Stdout> {
    pub fn stdout() -> Result<Self, TerminalUnavailable> {
        if !cfg!(unix) {
            return Err(TerminalUnavailable::Unsupported);
        }
        let out = io::stdout();
        if !out.is_tty() {
            return Err(TerminalUnavailable::NotATerminal);
        }

        let reporter = Self::new(out, 0);
        let weak = Arc::downgrade(&reporter.state);
        resize::watch(move || match weak.upgrade() {
            Some(state) => {
                refresh_width(&state);
                true
            }
            None => false,
        })?;

        // Queried after the watcher is installed so no resize is lost
        let (cols, _) = terminal::size()?;
        reporter.lock().cols = cols;
        Ok(reporter)
    }
}

fn refresh_width<W>(state: &Mutex<State<W>>) {
    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    match terminal::size() {
        Ok((cols, _)) => state.cols = cols,
        Err(e) => log::debug!("Could not read terminal size: {}", e),
    }
}

impl<W: Write + Send> TerminalReporter<W> {
    /// Reporter drawing on `out`, assuming a fixed width of `cols`
    pub fn new(out: W, cols: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                cols,
                unfinished: HashMap::new(),
                deps: DepSet::default(),
                out,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<W>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut State<W>) -> io::Result<()>) {
        let mut state = self.lock();
        let res = f(&mut *state).and_then(|()| state.draw_status());
        if let Err(e) = res {
            log::debug!("Terminal write failed: {}", e);
        }
    }
}

impl<W: Write> State<W> {
    fn draw_status(&mut self) -> io::Result<()> {
        let blocked: BTreeSet<TaskId> = self.deps.blocked();
        let mut running: Vec<TaskId> = self
            .unfinished
            .keys()
            .filter(|id| !blocked.contains(id))
            .copied()
            .collect();
        running.sort_unstable();
        let blocked: Vec<TaskId> = blocked.into_iter().collect();

        // The last column stays free, or the cursor wraps to a line that
        // can no longer be cleared
        let max = usize::from(self.cols).saturating_sub(1);
        let running_text = format_running_tasks(max, &running, &self.unfinished);
        let blocked_text = format_blocked_tasks(max.saturating_sub(width(&running_text)), &blocked);

        queue!(
            self.out,
            Clear(ClearType::UntilNewLine),
            SetForegroundColor(Color::Grey),
            Print(blocked_text),
            SetForegroundColor(Color::DarkBlue),
            Print(running_text),
            ResetColor,
            Print('\r'),
        )?;
        self.out.flush()
    }

    fn print_line(&mut self, task: &Task, line: &LogLine) -> io::Result<()> {
        queue!(
            self.out,
            Clear(ClearType::UntilNewLine),
            Print(task.string_id()),
            Print(' ')
        )?;
        match line.stream {
            Stream::Stderr => queue!(
                self.out,
                SetForegroundColor(Color::DarkRed),
                Print(line.line.trim_end_matches('\n')),
                ResetColor,
                Print('\n'),
            ),
            Stream::Stdout => queue!(self.out, Print(&line.line)),
        }
    }
}

impl<W: Write + Send> Reporter for TerminalReporter<W> {
    fn started(&self, task: &Task) {
        self.update(|state| {
            state
                .unfinished
                .insert(task.id(), task.short_name().to_string());
            Ok(())
        });
    }

    fn finished(&self, task: &Task) {
        self.update(|state| {
            state.deps.unblock(task.id());
            state.unfinished.remove(&task.id());
            Ok(())
        });
    }

    fn dependencies(&self, dependent: &Task, dependees: &[Arc<Task>], _sequential: bool) {
        self.update(|state| {
            for dependee in dependees {
                state.deps.add(dependent.id(), dependee.id());
            }
            Ok(())
        });
    }

    fn output_line(&self, task: &Task, _time: DateTime<Utc>, line: &LogLine) {
        self.update(|state| state.print_line(task, line));
    }
}
