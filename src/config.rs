//! # Global runtime configuration.
//!
//! Provides [`RuntimeConfig`], the settings shared by the app driver, the
//! lifecycle coordinator, and the task runners.
//!
//! Config is consumed once by [`AppBuilder::new`](crate::AppBuilder::new) and
//! then carried (cloned) by the [`Supervisor`](crate::Supervisor).
//!
//! ## Version semantics
//! The `version` tag doubles as the panic-handling switch: `"dev"` selects
//! development mode, where panics propagate instead of being recovered.
//! Anything else (including `"test"`) recovers panics.

use std::time::Duration;

/// Settings for one process run.
///
/// ## Field semantics
/// - `version`: build/version tag; `"dev"` enables panic propagation
/// - `node_index`: index of this node in a multi-node deployment
/// - `lifecycle_timeout`: wall-clock bound for the start phase, the stop
///   phase, and the persistent-task drain (each, not combined)
/// - `cancel_wait`: how long a task handle's `cancel()` waits for the loop to
///   acknowledge before degrading to a warning
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Build/version tag supplied by the CLI or config collaborator.
    pub version: String,

    /// Index of this node; carried for components that need a stable node id.
    pub node_index: u16,

    /// Bound on the start phase, the stop phase, and the final drain.
    pub lifecycle_timeout: Duration,

    /// Bound on waiting for a task loop to acknowledge cancellation.
    pub cancel_wait: Duration,
}

impl RuntimeConfig {
    /// Creates a config with the given version tag and node index and the
    /// default timeouts.
    pub fn new(version: impl Into<String>, node_index: u16) -> Self {
        Self {
            version: version.into(),
            node_index,
            ..Self::default()
        }
    }

    /// True when the version tag selects development mode.
    #[inline]
    pub fn is_dev_version(&self) -> bool {
        self.version == "dev"
    }

    /// True when the version tag selects test mode.
    #[inline]
    pub fn is_test_version(&self) -> bool {
        self.version == "test"
    }

    /// True when the version tag selects production mode.
    #[inline]
    pub fn is_prod_version(&self) -> bool {
        self.version == "prod"
    }
}

impl Default for RuntimeConfig {
    /// Default configuration:
    ///
    /// - `version = "dev"` (panics propagate; override for deployments)
    /// - `node_index = 0`
    /// - `lifecycle_timeout = 20s`
    /// - `cancel_wait = 10s`
    fn default() -> Self {
        Self {
            version: "dev".to_string(),
            node_index: 0,
            lifecycle_timeout: Duration::from_secs(20),
            cancel_wait: Duration::from_secs(10),
        }
    }
}
