//! Error types used by the chassis runtime and the components it hosts.
//!
//! This module defines the full error taxonomy:
//!
//! - [`GraphError`] — dependency-graph defects, detected while building the app.
//! - [`BuildError`] — graph defects plus named constructor failures.
//! - [`LifecycleError`] — a component's Start/Stop failure, or a phase timeout.
//! - [`PanicError`] — a recovered panic carrying message and backtrace.
//! - [`TaskError`] — errors raised by scheduled/polling task bodies.
//!
//! Build and Start errors are fatal: the driver exits non-zero. Everything
//! else is recovered at the nearest supervisory boundary (spawn wrapper, task
//! runner, lifecycle hook) and either logged or mapped to a state transition.

use std::time::Duration;

use thiserror::Error;

/// Boxed error type accepted from component constructors and Start/Stop hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Dependency-graph defects.
///
/// All variants are detected while [`AppBuilder::build`](crate::AppBuilder::build)
/// resolves the graph — never at first use.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GraphError {
    /// Two providers (or a provider and a supplied value) claim the same type.
    #[error("type {type_name} is provided more than once")]
    Duplicate {
        /// The doubly-provided type.
        type_name: &'static str,
    },

    /// A declared dependency has no provider and no supplied value.
    #[error("type {type_name} required by {required_by} is not provided")]
    Unsatisfied {
        /// The missing type.
        type_name: &'static str,
        /// The provider that declared the dependency.
        required_by: &'static str,
    },

    /// A set of providers depends on itself.
    #[error("dependency cycle between: {}", members.join(", "))]
    Cycle {
        /// Type names participating in the cycle, in registration order.
        members: Vec<&'static str>,
    },

    /// A constructor asked the resolver for a type it never declared.
    #[error("constructor for {component} resolved undeclared dependency {type_name}")]
    Undeclared {
        /// The type that was fetched without being declared.
        type_name: &'static str,
        /// The offending constructor's component type.
        component: &'static str,
    },
}

impl GraphError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            GraphError::Duplicate { .. } => "graph_duplicate",
            GraphError::Unsatisfied { .. } => "graph_unsatisfied",
            GraphError::Cycle { .. } => "graph_cycle",
            GraphError::Undeclared { .. } => "graph_undeclared",
        }
    }
}

/// # Errors produced while building the app object graph.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BuildError {
    /// The dependency graph itself is defective.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A constructor ran and failed.
    #[error("constructor for [{component}] failed")]
    Constructor {
        /// The component type whose constructor failed.
        component: &'static str,
        /// The underlying constructor error.
        #[source]
        source: BoxError,
    },
}

/// # Errors produced by the lifecycle coordinator.
///
/// `Start` is fatal: remaining Start hooks are aborted and the driver exits
/// non-zero after stopping the already-started prefix. `Stop` failures are
/// collected best-effort — every eligible hook still runs.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A component's Start hook returned an error.
    #[error("component [{component}] start failed")]
    Start {
        /// The failing component's name.
        component: String,
        /// The underlying Start error.
        #[source]
        source: BoxError,
    },

    /// A component's Stop hook returned an error.
    #[error("component [{component}] stop failed")]
    Stop {
        /// The failing component's name.
        component: String,
        /// The underlying Stop error.
        #[source]
        source: BoxError,
    },

    /// A whole lifecycle phase exceeded its wall-clock bound.
    #[error("{phase} phase timed out after {timeout:?}")]
    PhaseTimeout {
        /// `"start"` or `"stop"`.
        phase: &'static str,
        /// The configured bound that was exceeded.
        timeout: Duration,
    },
}

/// A panic recovered by the supervisor, carrying the payload message and the
/// backtrace captured at the recovery point.
///
/// Produced only in production mode; in development mode panics propagate
/// instead (see [`PanicMode`](crate::PanicMode)).
#[derive(Error, Debug)]
#[error("panic: {message}")]
pub struct PanicError {
    /// Stringified panic payload.
    pub message: String,
    /// Captured backtrace, rendered.
    pub backtrace: String,
}

/// # Errors produced by scheduled/polling task bodies.
///
/// `Canceled` is the distinguished cancellation condition: the runner
/// transitions the handle to Canceled and exits the loop. Everything else is
/// logged as a warning and the loop continues.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// The body observed cancellation and wants the loop to end.
    #[error("task canceled")]
    Canceled,

    /// The body failed; the loop keeps running.
    #[error("task failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The body panicked and the panic was recovered; the loop keeps running.
    #[error(transparent)]
    Panic(#[from] PanicError),

    /// A task's one-time prepare step failed; the task was never spawned.
    #[error("prepare for task [{task}] failed")]
    Prepare {
        /// The task that failed to prepare.
        task: String,
        /// The underlying prepare error.
        #[source]
        source: BoxError,
    },
}

impl TaskError {
    /// Wraps an arbitrary error message into a non-fatal task failure.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// True for the distinguished cancellation condition.
    #[inline]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Canceled => "task_canceled",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panic(_) => "task_panicked",
            TaskError::Prepare { .. } => "task_prepare_failed",
        }
    }
}
