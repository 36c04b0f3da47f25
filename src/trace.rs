//! Trace export - task timelines in Chrome trace_event format
//!
//! The output loads in `chrome://tracing` and Perfetto. Each task is shown
//! as its own thread; compute spans are drawn as slices, time spent waiting
//! for dependencies is left empty.

use crate::core::{Task, TaskState};
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Event phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "M")]
    Metadata,
    #[serde(rename = "I")]
    Instant,
    #[serde(rename = "X")]
    Complete,
}

/// A single trace record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    #[serde(rename = "cat", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "ph")]
    pub phase: Phase,
    pub pid: u32,
    pub tid: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
    /// Microseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    /// Instant event scope, `g` for global
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Microseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<i64>,
    #[serde(rename = "cname", default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl TraceEvent {
    fn new(name: String, phase: Phase, pid: u32, task: &Task) -> Self {
        Self {
            name,
            category: None,
            phase,
            pid,
            tid: task.id(),
            args: BTreeMap::new(),
            ts: None,
            scope: None,
            dur: None,
            color: None,
        }
    }

    fn instant(name: String, pid: u32, task: &Task, time: DateTime<Utc>) -> Self {
        Self {
            ts: Some(time.timestamp_micros()),
            scope: Some("g".to_string()),
            ..Self::new(name, Phase::Instant, pid, task)
        }
    }
}

/// Trace records for every task that ran, in task ID order
pub fn collect_events(tasks: &[Arc<Task>], pid: u32) -> Vec<TraceEvent> {
    let mut events = Vec::new();

    for task in tasks {
        if task.state() == TaskState::Created {
            continue;
        }
        let (Some(start), Some(end)) = (task.start(), task.end()) else {
            continue;
        };
        let label = task.to_string();

        let mut meta = TraceEvent::new("thread_name".to_string(), Phase::Metadata, pid, task);
        meta.args.insert("name".to_string(), label.clone());
        events.push(meta);
        events.push(TraceEvent::instant(format!("start {}", label), pid, task, start));
        events.push(TraceEvent::instant(format!("end {}", label), pid, task, end));

        for span in task.spans().iter().filter(|s| s.is_compute()) {
            events.push(TraceEvent {
                category: Some("compute".to_string()),
                ts: Some(span.start.timestamp_micros()),
                dur: Some(i64::try_from(span.duration().as_micros()).unwrap_or(i64::MAX)),
                color: Some("thread_state_running".to_string()),
                ..TraceEvent::new("compute".to_string(), Phase::Complete, pid, task)
            });
        }
    }
    events
}

/// Write the trace of `tasks` to `path` as a JSON array
pub fn write_trace(path: &Path, tasks: &[Arc<Task>]) -> Result<()> {
    let events = collect_events(tasks, std::process::id());
    let data = serde_json::to_vec(&events).context("Failed to encode trace")?;
    fs::write(path, data)
        .with_context(|| format!("Failed to save trace file {}", path.display()))?;
    log::debug!("Wrote {} trace events to {}", events.len(), path.display());
    Ok(())
}
