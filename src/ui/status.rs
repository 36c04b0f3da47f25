//! Status line layout
//!
//! ```text
//! ... #1234 #4565 #6666 #7777 #8888 #9999 doing.Stuff
//! ^^^^^^^^^^^^^^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
//! blocked tasks   running tasks, with as many names as fit
//! ```
//!
//! When the line is too wide, blocked tasks are clipped first, then the
//! names of running tasks are dropped, and finally running tasks are
//! clipped.

use crate::core::TaskId;
use std::collections::HashMap;

const ELLIPSIS: &str = "...";

/// Running tasks as `#0001 name #0002 name`, at most `max` chars wide
pub(crate) fn format_running_tasks(
    max: usize,
    running: &[TaskId],
    names: &HashMap<TaskId, String>,
) -> String {
    if running.is_empty() {
        return String::new();
    }
    if max < ELLIPSIS.len() {
        return ELLIPSIS[..max].to_string();
    }

    let ids: Vec<String> = running
        .iter()
        .enumerate()
        .map(|(i, id)| {
            if i == 0 {
                format!("#{:04}", id)
            } else {
                format!(" #{:04}", id)
            }
        })
        .collect();
    let mut texts: Vec<String> = running
        .iter()
        .map(|id| format!(" {}", names.get(id).map(String::as_str).unwrap_or("")))
        .collect();

    let mut total: usize = ids.iter().chain(texts.iter()).map(|s| width(s)).sum();
    for text in texts.iter_mut() {
        if total <= max {
            break;
        }
        total -= width(text);
        text.clear();
    }

    let line: String = ids
        .iter()
        .zip(&texts)
        .flat_map(|(id, text)| [id.as_str(), text.as_str()])
        .collect();
    clip_front(line, max)
}

/// Blocked task IDs as `#0001 #0002 `, at most `max` chars wide
pub(crate) fn format_blocked_tasks(max: usize, blocked: &[TaskId]) -> String {
    if blocked.is_empty() {
        return String::new();
    }
    if max < ELLIPSIS.len() {
        return ELLIPSIS[..max].to_string();
    }

    let line: String = blocked.iter().map(|id| format!("#{:04} ", id)).collect();
    clip_front(line, max)
}

pub(crate) fn width(s: &str) -> usize {
    s.chars().count()
}

/// Keep the tail of `line`, replacing the head with an ellipsis
fn clip_front(line: String, max: usize) -> String {
    let len = width(&line);
    if len <= max {
        return line;
    }
    let keep = max - ELLIPSIS.len();
    let tail: String = line.chars().skip(len - keep).collect();
    format!("{}{}", ELLIPSIS, tail)
}
