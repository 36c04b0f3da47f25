//! Outstanding dependency edges between running tasks

use crate::core::TaskId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    from: TaskId,
    to: TaskId,
}

/// Multiset of `dependent -> dependee` edges
#[derive(Debug, Default)]
pub(crate) struct DepSet {
    edges: Vec<Edge>,
}

impl DepSet {
    pub(crate) fn add(&mut self, from: TaskId, to: TaskId) {
        self.edges.push(Edge { from, to });
    }

    /// Tasks waiting on at least one dependee, ascending
    pub(crate) fn blocked(&self) -> BTreeSet<TaskId> {
        self.edges.iter().map(|e| e.from).collect()
    }

    /// Drop every edge pointing at `to`
    pub(crate) fn unblock(&mut self, to: TaskId) {
        self.edges.retain(|e| e.to != to);
    }
}
