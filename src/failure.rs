//! Failure report - prints the tree of failed tasks after a run

use crate::core::{Stream, Task, TaskId};
use crate::error::TaskError;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// Output lines shown per failed task
pub const MAX_TAIL_LINES: usize = 200;

const INDENT: &str = "    ";

/// Last [`MAX_TAIL_LINES`] lines of a task's output
pub fn task_tail(task: &Task) -> String {
    let output = task.output();
    let mut out = String::new();
    let start = output.len().saturating_sub(MAX_TAIL_LINES);
    if start > 0 {
        out.push_str("<truncated, see logs above>\n");
    }
    for line in &output[start..] {
        out.push_str(match line.stream {
            Stream::Stderr => "E | ",
            Stream::Stdout => "  | ",
        });
        out.push_str(&line.line);
    }
    out
}

/// Render the failure tree rooted at `task`, depth first.
///
/// Aggregate failures list their failed dependencies one level deeper.
/// Other failures show their message and the task's output tail; a task
/// reached again through another path refers back to the first listing.
pub fn format_failures(task: &Arc<Task>) -> String {
    let mut out = String::from("\n");
    let mut seen = HashSet::new();
    format_failure(&mut out, &mut seen, task, 0);
    out
}

fn format_failure(out: &mut String, seen: &mut HashSet<TaskId>, task: &Arc<Task>, depth: usize) {
    let Some(err) = task.error() else {
        return;
    };
    let indent = INDENT.repeat(depth);
    let prefix = format!("{}{} failed", indent, task);

    if let TaskError::Subtasks(failure) = &err {
        let _ = writeln!(out, "{}, caused by", prefix);
        for subtask in failure.tasks() {
            format_failure(out, seen, subtask, depth + 1);
        }
        return;
    }

    let mut msg = err.to_string();
    if let Some(location) = err.panic_location() {
        msg = format!("{} @ {}", msg.trim_end_matches('\n'), location);
    }
    write_indented(out, &format!("{}: ", prefix), msg.trim_end_matches('\n'));
    if seen.insert(task.id()) {
        write_indented(out, &indent, &task_tail(task));
    } else {
        write_indented(out, &indent, "<see above>");
    }
}

/// First line after `prefix`, the rest aligned under it
fn write_indented(out: &mut String, prefix: &str, msg: &str) {
    let pad = " ".repeat(prefix.chars().count());
    let mut lines = msg.split('\n');
    let _ = writeln!(out, "{}{}", prefix, lines.next().unwrap_or(""));
    for line in lines {
        let _ = writeln!(out, "{}{}", pad, line);
    }
}
