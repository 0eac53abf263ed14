//! # Background-task runners and their shared types.
//!
//! This module provides the two supervised task shapes:
//! - [`scheduled`] — ticking tasks with pause/resume/cancel
//! - [`polling`] — tight-loop tasks with prepare/cleanup and cancel
//!
//! Shared types:
//! - [`TaskControl`] — the body's tagged outcome (continue vs stop cleanly);
//!   fatal conditions are expressed as [`TaskError`](crate::TaskError)
//! - [`TaskState`] — observable handle state
//! - [`Cleanup`] — one-shot cleanup callback returned by a polling prepare
//!
//! Task bodies receive the handle's derived `CancellationToken` and are
//! expected to observe it: there is no preemption.

pub(crate) mod polling;
pub(crate) mod scheduled;

pub use polling::PollingTaskHandle;
pub use scheduled::ScheduledTaskHandle;

/// One-shot cleanup callback attached to a polling task.
pub type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Tagged outcome of one body invocation.
///
/// Replaces in-band control flow (panics, sentinel errors): the body states
/// explicitly whether the loop should go on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskControl {
    /// Keep looping.
    Continue,
    /// Stop cleanly; the handle transitions to Canceled.
    Stop,
}

/// Observable state of a task handle.
///
/// `Canceled` is terminal; a paused task is still alive (its clock keeps
/// ticking, only the body is skipped).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// The loop is active.
    Running,
    /// Ticks are skipped until `resume()` (scheduled tasks only).
    Paused,
    /// The loop has exited or is exiting. Terminal.
    Canceled,
}

impl TaskState {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            TaskState::Running => 0,
            TaskState::Paused => 1,
            TaskState::Canceled => 2,
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Running,
            1 => TaskState::Paused,
            _ => TaskState::Canceled,
        }
    }
}
