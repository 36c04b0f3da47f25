//! Panic capture for task bodies
//!
//! A panicking task body is recorded as the task's failure. With the hook
//! from [`install_panic_hook`] in place, such panics are not printed to
//! stderr, where they would tear through the live status line; panics
//! outside task bodies still reach the previous hook.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    // Task bodies currently executing on this thread
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// A panic caught while running a task body
pub(crate) struct Caught {
    pub payload: Box<dyn Any + Send>,
    pub location: Option<String>,
}

/// Install a process-wide panic hook that keeps task-body panics quiet and
/// records where they happened. Idempotent.
pub fn install_panic_hook() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if DEPTH.with(Cell::get) > 0 {
                let location = info.location().map(|l| l.to_string());
                LOCATION.with(|slot| *slot.borrow_mut() = location);
            } else {
                previous(info);
            }
        }));
        log::debug!("Installed task panic hook");
    });
}

/// Run `f`, catching a panic together with its location
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> Result<R, Caught> {
    DEPTH.with(|d| d.set(d.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    DEPTH.with(|d| d.set(d.get() - 1));

    result.map_err(|payload| Caught {
        payload,
        location: LOCATION.with(|slot| slot.borrow_mut().take()),
    })
}
