//! # Opt-in tracing-subscriber bootstrap.
//!
//! The framework itself only *emits* `tracing` events; binaries that have no
//! subscriber of their own can call [`init`] to get a sensible default:
//! env-filtered (`RUST_LOG`), compact, with targets.
//!
//! Enabled via the `logging` feature.

use tracing_subscriber::EnvFilter;

use crate::error::BoxError;

/// Installs the default global subscriber.
///
/// `default_directive` applies when `RUST_LOG` is unset (e.g. `"info"` or
/// `"info,chassis=debug"`). Fails if a global subscriber is already set.
pub fn init(default_directive: &str) -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()?;
    Ok(())
}
