//! Terminal resize notifications

use std::io;

/// Call `on_resize` on every window size change until it returns `false`.
///
/// The signal handler is installed before this returns, so a resize that
/// happens right after a width query is not missed.
#[cfg(unix)]
pub(crate) fn watch<F>(on_resize: F) -> io::Result<()>
where
    F: Fn() -> bool + Send + 'static,
{
    use tokio::signal::unix::{signal, SignalKind};

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut winch = {
        let _guard = runtime.enter();
        signal(SignalKind::window_change())?
    };

    std::thread::Builder::new()
        .name("tusk-resize".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while winch.recv().await.is_some() {
                    if !on_resize() {
                        break;
                    }
                }
            });
            log::debug!("Resize watcher stopped");
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn watch<F>(_on_resize: F) -> io::Result<()>
where
    F: Fn() -> bool + Send + 'static,
{
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "resize notifications are only available under Unix",
    ))
}
