//! # Panic guards for supervised execution.
//!
//! Wraps closures and futures in `catch_unwind` so a panic inside user code
//! is converted into a [`PanicError`] carrying the payload message and a
//! captured backtrace — exactly one supervisory boundary away from where it
//! happened.
//!
//! ## Modes
//! - [`PanicMode::Recover`] (production): the panic becomes an error, the
//!   caller keeps running.
//! - [`PanicMode::Propagate`] (development, `version == "dev"`): the guard is
//!   a no-op and the panic unwinds normally, so it surfaces immediately in
//!   local runs and tests.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::error::PanicError;

/// How supervised code treats panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanicMode {
    /// Catch the panic and surface it as a [`PanicError`].
    Recover,
    /// Let the panic unwind (development mode).
    Propagate,
}

impl PanicMode {
    /// Derives the mode from the version tag.
    pub fn from_version(version: &str) -> Self {
        if version == "dev" {
            PanicMode::Propagate
        } else {
            PanicMode::Recover
        }
    }
}

/// Stringifies a panic payload (`&str` and `String` payloads cover `panic!`).
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn capture(payload: Box<dyn Any + Send>) -> PanicError {
    PanicError {
        message: panic_message(payload.as_ref()),
        backtrace: Backtrace::force_capture().to_string(),
    }
}

/// Runs a closure under the panic guard.
pub(crate) fn guard_call<T>(mode: PanicMode, call: impl FnOnce() -> T) -> Result<T, PanicError> {
    match mode {
        PanicMode::Propagate => Ok(call()),
        PanicMode::Recover => {
            std::panic::catch_unwind(AssertUnwindSafe(call)).map_err(capture)
        }
    }
}

/// Runs a future under the panic guard.
pub(crate) async fn guard_future<T>(
    mode: PanicMode,
    future: impl Future<Output = T>,
) -> Result<T, PanicError> {
    match mode {
        PanicMode::Propagate => Ok(future.await),
        PanicMode::Recover => AssertUnwindSafe(future).catch_unwind().await.map_err(capture),
    }
}
