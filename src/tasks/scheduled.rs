//! # Scheduled task runner: ticking execution with pause/resume/cancel.
//!
//! A scheduled task invokes its body on a fixed interval until it is
//! canceled. The handle exposes a small state machine:
//!
//! ```text
//!            pause()
//!   Running ─────────► Paused
//!      ▲                 │
//!      └─────────────────┘
//!            resume()
//!
//!   Running | Paused ──► Canceled     (terminal)
//!      via: cancel() | context canceled | body returns Stop
//!           | body reports TaskError::Canceled
//! ```
//!
//! ## Rules
//! - The first tick fires one full interval after spawn.
//! - While Paused the clock keeps ticking; only the body is skipped.
//! - The body runs under the panic guard; a recovered panic or any
//!   non-cancellation error is logged as a warning and the loop continues.
//! - Ticks missed while the body runs are skipped, never bursted.
//! - `cancel()` blocks until the loop acknowledges via the one-shot
//!   rendezvous token or `cancel_wait` elapses (warn) — never forever.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TaskError;
use crate::supervisor::{recover, PanicMode};
use crate::tasks::{TaskControl, TaskState};

/// Handle to a running scheduled task.
///
/// Cheap to clone; all clones observe and drive the same task.
#[derive(Clone)]
pub struct ScheduledTaskHandle {
    name: Arc<str>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    finished: CancellationToken,
    cancel_wait: Duration,
}

impl std::fmt::Debug for ScheduledTaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTaskHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ScheduledTaskHandle {
    pub(crate) fn new(name: Arc<str>, cancel: CancellationToken, cancel_wait: Duration) -> Self {
        Self {
            name,
            state: Arc::new(AtomicU8::new(TaskState::Running.as_u8())),
            cancel,
            finished: CancellationToken::new(),
            cancel_wait,
        }
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True until the task transitions to Canceled (a paused task is running).
    pub fn is_running(&self) -> bool {
        self.state() != TaskState::Canceled
    }

    /// True while ticks are being skipped.
    pub fn is_paused(&self) -> bool {
        self.state() == TaskState::Paused
    }

    /// Returns the task's derived cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Skips body execution on subsequent ticks. No-op once Canceled.
    pub fn pause(&self) {
        let _ = self.state.compare_exchange(
            TaskState::Running.as_u8(),
            TaskState::Paused.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Resumes body execution on the same handle. No-op once Canceled.
    pub fn resume(&self) {
        let _ = self.state.compare_exchange(
            TaskState::Paused.as_u8(),
            TaskState::Running.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Cancels the task and waits for the loop to acknowledge.
    ///
    /// Idempotent; safe to call from several tasks at once — every caller
    /// returns once the loop acknowledges or after `cancel_wait`, whichever
    /// comes first. A timeout is logged as a warning, never an error.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        tokio::select! {
            _ = self.finished.cancelled() => {}
            _ = time::sleep(self.cancel_wait) => {
                warn!(task = %self.name, "wait for scheduled task cancel acknowledgment timed out");
            }
        }
    }

    /// Marks the handle terminal without a loop ever having run.
    ///
    /// Used when a prepare step fails: `cancel()` on such a handle must not
    /// wait out the rendezvous bound.
    pub(crate) fn abort_before_spawn(&self) {
        self.cancel.cancel();
        self.mark_canceled();
        self.finished.cancel();
    }

    fn mark_canceled(&self) {
        self.state
            .store(TaskState::Canceled.as_u8(), Ordering::SeqCst);
    }
}

/// Runner loop; spawned (plain or persistent) by the supervisor.
pub(crate) async fn drive<B, Fut>(
    handle: ScheduledTaskHandle,
    every: Duration,
    mode: PanicMode,
    body: B,
) where
    B: Fn(CancellationToken) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<TaskControl, TaskError>> + Send + 'static,
{
    info!(task = %handle.name, interval = ?every, "scheduled task started");

    let mut ticker = time::interval_at(time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if handle.is_paused() {
                    continue;
                }
                let outcome = match recover::guard_future(mode, body(handle.token())).await {
                    Ok(result) => result,
                    Err(panic) => Err(TaskError::Panic(panic)),
                };
                match outcome {
                    Ok(TaskControl::Continue) => {}
                    Ok(TaskControl::Stop) | Err(TaskError::Canceled) => handle.mark_canceled(),
                    Err(err) => {
                        warn!(task = %handle.name, err = %err, "scheduled task tick failed");
                    }
                }
            }
            _ = handle.cancel.cancelled() => handle.mark_canceled(),
        }
        if !handle.is_running() {
            break;
        }
    }

    info!(task = %handle.name, "scheduled task stopped");
    handle.cancel.cancel();
    handle.finished.cancel();
}
