//! # Polling task runner: back-to-back execution with prepare/cleanup.
//!
//! A polling task re-invokes its body continuously (no tick interval) until
//! it is canceled. An optional one-time prepare step may hand back a cleanup
//! callback that is guaranteed to run exactly once:
//!
//! ```text
//! prepare(token) ──► Some(cleanup) ──► loop {
//!                                        token canceled?  → Canceled
//!                                        body(token)      → Continue | Stop | Err
//!                                      }
//!                                      ──► cleanup()   (once, atomic take)
//!           cancel() ─────────────────────► cleanup()   (same take — loser is a no-op)
//! ```
//!
//! ## Rules
//! - The token is checked (non-blocking) before every body invocation.
//! - Cleanup ownership is an atomic take, not a flag: two concurrent
//!   `cancel()` callers and the exiting loop resolve to exactly one run.
//! - `cancel()` runs the cleanup eagerly, then waits (bounded) for the loop
//!   to acknowledge via the one-shot rendezvous token.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TaskError;
use crate::supervisor::{recover, PanicMode};
use crate::tasks::{Cleanup, TaskControl, TaskState};

/// Holder of the at-most-one cleanup callback.
///
/// Take-based: whoever takes the callback runs it; everyone else sees `None`.
pub(crate) struct CleanupSlot(Mutex<Option<Cleanup>>);

impl CleanupSlot {
    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self(Mutex::new(None)))
    }

    pub(crate) fn holding(cleanup: Option<Cleanup>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(cleanup)))
    }

    fn run_once(&self) {
        let taken = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cleanup) = taken {
            cleanup();
        }
    }
}

/// Handle to a running polling task.
///
/// Cheap to clone; all clones observe and drive the same task.
#[derive(Clone)]
pub struct PollingTaskHandle {
    name: Arc<str>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    finished: CancellationToken,
    cancel_wait: Duration,
    cleanup: Arc<CleanupSlot>,
}

impl std::fmt::Debug for PollingTaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingTaskHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PollingTaskHandle {
    pub(crate) fn new(
        name: Arc<str>,
        cancel: CancellationToken,
        cancel_wait: Duration,
        cleanup: Arc<CleanupSlot>,
    ) -> Self {
        Self {
            name,
            state: Arc::new(AtomicU8::new(TaskState::Running.as_u8())),
            cancel,
            finished: CancellationToken::new(),
            cancel_wait,
            cleanup,
        }
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state (polling tasks never pause).
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True until the task transitions to Canceled.
    pub fn is_running(&self) -> bool {
        self.state() != TaskState::Canceled
    }

    /// Returns the task's derived cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the task, runs the cleanup (if still owed), and waits for the
    /// loop to acknowledge.
    ///
    /// Idempotent; concurrent callers race for the single cleanup run and all
    /// return once the loop acknowledges or after `cancel_wait`.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        self.cleanup.run_once();
        tokio::select! {
            _ = self.finished.cancelled() => {}
            _ = time::sleep(self.cancel_wait) => {
                warn!(task = %self.name, "wait for polling task cancel acknowledgment timed out");
            }
        }
    }

    fn mark_canceled(&self) {
        self.state
            .store(TaskState::Canceled.as_u8(), Ordering::SeqCst);
    }
}

/// Runner loop; spawned (plain or persistent) by the supervisor.
pub(crate) async fn drive<B, Fut>(handle: PollingTaskHandle, mode: PanicMode, body: B)
where
    B: Fn(CancellationToken) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<TaskControl, TaskError>> + Send + 'static,
{
    info!(task = %handle.name, "polling task started");

    loop {
        if handle.cancel.is_cancelled() {
            handle.mark_canceled();
        } else {
            let outcome = match recover::guard_future(mode, body(handle.token())).await {
                Ok(result) => result,
                Err(panic) => Err(TaskError::Panic(panic)),
            };
            match outcome {
                Ok(TaskControl::Continue) => {}
                Ok(TaskControl::Stop) | Err(TaskError::Canceled) => handle.mark_canceled(),
                Err(err) => {
                    warn!(task = %handle.name, err = %err, "polling task iteration failed");
                }
            }
        }
        if !handle.is_running() {
            break;
        }
    }

    handle.cleanup.run_once();
    info!(task = %handle.name, "polling task stopped");
    handle.cancel.cancel();
    handle.finished.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use crate::config::RuntimeConfig;
    use crate::core::AppBuilder;
    use crate::supervisor::Supervisor;

    fn supervisor() -> Arc<Supervisor> {
        let app = AppBuilder::new(RuntimeConfig::new("test", 0))
            .build()
            .expect("empty graph builds");
        Arc::clone(app.supervisor())
    }

    #[tokio::test]
    async fn test_body_reinvoked_back_to_back() {
        let supervisor = supervisor();
        let iterations = Arc::new(AtomicUsize::new(0));
        let iterations_in_body = Arc::clone(&iterations);

        let handle = supervisor.run_polling_task("spinner", false, move |_token| {
            let iterations = Arc::clone(&iterations_in_body);
            async move {
                iterations.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(TaskControl::Continue)
            }
        });

        time::sleep(Duration::from_millis(50)).await;
        assert!(
            iterations.load(Ordering::SeqCst) > 10,
            "no interval between iterations"
        );
        handle.cancel().await;
        assert_eq!(handle.state(), TaskState::Canceled);
    }

    #[tokio::test]
    async fn test_cleanup_runs_exactly_once_on_internal_stop() {
        let supervisor = supervisor();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let cleanups_in_prepare = Arc::clone(&cleanups);

        let handle = supervisor
            .run_polling_task_with_prepare(
                "finisher",
                false,
                move |_token| async move {
                    let cleanups = cleanups_in_prepare;
                    let cleanup: Cleanup = Box::new(move || {
                        cleanups.fetch_add(1, Ordering::SeqCst);
                    });
                    Ok(Some(cleanup))
                },
                |_token| async { Ok(TaskControl::Stop) },
            )
            .await
            .expect("prepare succeeds");

        time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_running());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        // Cancel after the fact: cleanup must not run again.
        handle.cancel().await;
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleanup_runs_exactly_once_under_racing_cancels() {
        // Repeated runs with skewed cancel timing to shake out take races.
        for lag_ms in [0u64, 1, 2, 0, 1, 2, 0, 1, 2, 3] {
            let supervisor = supervisor();
            let cleanups = Arc::new(AtomicUsize::new(0));
            let cleanups_in_prepare = Arc::clone(&cleanups);

            let handle = supervisor
                .run_polling_task_with_prepare(
                    "contended",
                    false,
                    move |_token| async move {
                        let cleanups = cleanups_in_prepare;
                        let cleanup: Cleanup = Box::new(move || {
                            cleanups.fetch_add(1, Ordering::SeqCst);
                        });
                        Ok(Some(cleanup))
                    },
                    |token| async move {
                        token.cancelled().await;
                        Err(TaskError::Canceled)
                    },
                )
                .await
                .expect("prepare succeeds");

            let racer = handle.clone();
            let other = tokio::spawn(async move {
                time::sleep(Duration::from_millis(lag_ms)).await;
                racer.cancel().await;
            });
            handle.cancel().await;
            other.await.expect("racing cancel joins");

            assert_eq!(cleanups.load(Ordering::SeqCst), 1, "lag {lag_ms}ms");
            assert_eq!(handle.state(), TaskState::Canceled);
        }
    }

    #[tokio::test]
    async fn test_external_cancel_stops_cooperative_body() {
        let supervisor = supervisor();
        let handle = supervisor.run_polling_task("listener", false, |token| async move {
            token.cancelled().await;
            Err(TaskError::Canceled)
        });

        let begin = Instant::now();
        handle.cancel().await;
        assert!(begin.elapsed() < Duration::from_millis(500));
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_prepare_failure_cancels_token_and_reports() {
        let supervisor = supervisor();
        let err = supervisor
            .run_polling_task_with_prepare(
                "unprepared",
                false,
                |_token| async { Err("no socket".into()) },
                |_token| async { Ok(TaskControl::Continue) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Prepare { ref task, .. } if task == "unprepared"));
    }

    #[tokio::test]
    async fn test_body_error_keeps_polling() {
        let supervisor = supervisor();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_in_body = Arc::clone(&attempts);

        let handle = supervisor.run_polling_task("flaky", false, move |_token| {
            let attempts = Arc::clone(&attempts_in_body);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Err(TaskError::fail("transient"))
            }
        });

        time::sleep(Duration::from_millis(50)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert!(handle.is_running());
        handle.cancel().await;
    }
}
