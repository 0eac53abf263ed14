//! # Cross-platform OS termination-signal handling.
//!
//! [`wait_for_termination_signal`] completes when the process receives a
//! termination signal. The app driver races it against the in-process
//! shutdown trigger ([`Supervisor::shutdown`](crate::Supervisor::shutdown)).
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for hard stop)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal
/// registration fails.
#[cfg(unix)]
pub async fn wait_for_termination_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal
/// registration fails.
#[cfg(not(unix))]
pub async fn wait_for_termination_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
