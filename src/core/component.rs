//! # Component contract.
//!
//! A [`Component`] is a unit with an explicit Start/Stop lifecycle, managed by
//! the coordinator. Constructors create the component, then opt it in via
//! [`Supervisor::register_component`](crate::Supervisor::register_component).

use async_trait::async_trait;

use crate::error::BoxError;

/// # Named unit with an explicit Start/Stop lifecycle.
///
/// Start is invoked at most once during boot, in construction order; Stop at
/// most once during shutdown, in exact reverse order, and only after a
/// successful Start.
///
/// Both hooks should return promptly — long-running work belongs in a
/// supervised task (`Supervisor::spawn_persistent`, scheduled/polling
/// runners), stopped cooperatively via its cancellation token.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use chassis::{BoxError, Component};
///
/// struct Listener;
///
/// #[async_trait]
/// impl Component for Listener {
///     fn name(&self) -> &str {
///         "listener"
///     }
///
///     async fn start(&self) -> Result<(), BoxError> {
///         // bind sockets, spawn accept loop...
///         Ok(())
///     }
///
///     async fn stop(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Returns a stable, human-readable component name.
    fn name(&self) -> &str;

    /// Brings the component online. Must not block for the component's
    /// whole lifetime.
    async fn start(&self) -> Result<(), BoxError>;

    /// Takes the component offline.
    async fn stop(&self) -> Result<(), BoxError>;
}
