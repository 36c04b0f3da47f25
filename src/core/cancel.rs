//! Cooperative cancellation token with an optional deadline

use crate::error::Interrupted;
use crossbeam_channel::{after, at, never, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared cancellation state.
///
/// The engine never interrupts a running body. Bodies poll [`CancelToken::err`]
/// or sleep through [`CancelToken::sleep`], which wakes up early once the
/// token is cancelled or its deadline passes.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    // Dropping the sender disconnects `done_rx`, waking every waiter
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(Instant::now() + timeout))
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                done_tx: Mutex::new(Some(tx)),
                done_rx: rx,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let sender = self
            .inner
            .done_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the token is done, `None` while it is still live
    pub fn err(&self) -> Option<Interrupted> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return Some(Interrupted::Cancelled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupted::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Sleep for `duration`, returning early if the token becomes done
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        let deadline = match self.inner.deadline {
            Some(deadline) => at(deadline),
            None => never(),
        };
        select! {
            recv(self.inner.done_rx) -> _ => Err(Interrupted::Cancelled),
            recv(deadline) -> _ => Err(Interrupted::DeadlineExceeded),
            recv(after(duration)) -> _ => Ok(()),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
