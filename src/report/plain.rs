//! Plain reporter - one line per event, suitable for logs and pipes

use super::Reporter;
use crate::core::{LogLine, Stream, Task};
use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Writes every event as a line prefixed with the task ID
pub struct PlainReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl PlainReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> PlainReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        // Nowhere left to report a broken output stream
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

pub(crate) fn format_line(line: &LogLine) -> String {
    match line.stream {
        Stream::Stderr => format!("E | {}", line.line),
        Stream::Stdout => format!("  | {}", line.line),
    }
}

impl<W: Write + Send> Reporter for PlainReporter<W> {
    fn started(&self, task: &Task) {
        self.emit(&format!("{} STARTED {}\n", task.string_id(), task.name()));
    }

    fn finished(&self, task: &Task) {
        let tag = match task.error() {
            Some(err) => {
                let mut msg = err.to_string();
                if !msg.ends_with('\n') {
                    msg.push('\n');
                }
                let time = task.end().unwrap_or_else(Utc::now);
                for line in msg.split_inclusive('\n') {
                    self.output_line(
                        task,
                        time,
                        &LogLine {
                            stream: Stream::Stderr,
                            line: line.to_string(),
                        },
                    );
                }
                "FAILED"
            }
            None => "SUCCEEDED",
        };

        let total = task.duration();
        let own = task.self_duration();
        self.emit(&format!(
            "{} {} {} time={:.2}s, self={:.2}s, subtasks={:.2}s\n",
            task.string_id(),
            tag,
            task.name(),
            total.as_secs_f64(),
            own.as_secs_f64(),
            total.saturating_sub(own).as_secs_f64(),
        ));
    }

    fn dependencies(&self, dependent: &Task, dependees: &[Arc<Task>], sequential: bool) {
        let op = if sequential { "SEQDEPS" } else { "DEPS" };
        let list: Vec<String> = dependees.iter().map(|t| t.to_string()).collect();
        self.emit(&format!(
            "{} {} {} -> {}\n",
            dependent.string_id(),
            op,
            dependent.name(),
            list.join(", ")
        ));
    }

    fn output_line(&self, task: &Task, _time: DateTime<Utc>, line: &LogLine) {
        self.emit(&format!("{} {}", task.string_id(), format_line(line)));
    }
}
