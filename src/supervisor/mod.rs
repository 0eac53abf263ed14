//! # Supervisor: panic-safe spawning, background-task runners, shutdown plumbing.
//!
//! The [`Supervisor`] is the one object every component can depend on. It
//! carries the root cancellation context, the shutdown wait-group, and the
//! panic-handling mode, and exposes:
//!
//! - [`spawn`](Supervisor::spawn) / [`spawn_persistent`](Supervisor::spawn_persistent)
//!   — panic-safe task spawning; persistent tasks are tracked so the driver
//!   can drain them (bounded) at exit
//! - [`recover_execute`](Supervisor::recover_execute) /
//!   [`recover_execute_async`](Supervisor::recover_execute_async)
//!   — synchronous/async panic guards
//! - [`run_scheduled_task`](Supervisor::run_scheduled_task) — ticking tasks
//!   with pause/resume/cancel
//! - [`run_polling_task`](Supervisor::run_polling_task) — tight-loop tasks
//!   with prepare/cleanup and cancel
//! - [`register_component`](Supervisor::register_component) — lifecycle opt-in
//! - [`shutdown`](Supervisor::shutdown) — component-initiated process exit
//!
//! ## Panic semantics
//! In production mode a panic inside supervised code is recovered, logged
//! with its message and backtrace, and never affects the caller. In
//! development mode (`version == "dev"`) panics intentionally propagate to
//! aid local debugging.
//!
//! ## Shared state
//! The ready-callback list is the only mutable state here, behind its own
//! narrow lock that is never held while user code runs.

pub(crate) mod recover;

pub use recover::PanicMode;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::RuntimeConfig;
use crate::core::{Component, Lifecycle};
use crate::error::{BoxError, TaskError};
use crate::tasks::polling::{self, CleanupSlot, PollingTaskHandle};
use crate::tasks::scheduled::{self, ScheduledTaskHandle};
use crate::tasks::{Cleanup, TaskControl};

/// Boxed app-ready callback, executed once after all components started.
struct ReadyCallback {
    name: String,
    run: Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>,
}

/// Shared runtime services for components and background tasks.
pub struct Supervisor {
    cfg: RuntimeConfig,
    mode: PanicMode,
    root: CancellationToken,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    lifecycle: Arc<Lifecycle>,
    ready_callbacks: Mutex<Vec<ReadyCallback>>,
}

impl Supervisor {
    pub(crate) fn new(
        cfg: RuntimeConfig,
        root: CancellationToken,
        shutdown: CancellationToken,
        tracker: TaskTracker,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        let mode = PanicMode::from_version(&cfg.version);
        Self {
            cfg,
            mode,
            root,
            shutdown,
            tracker,
            lifecycle,
            ready_callbacks: Mutex::new(Vec::new()),
        }
    }

    // ---------------------------
    // Runtime context
    // ---------------------------

    /// Returns the runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.cfg
    }

    /// Returns the root cancellation token; canceled by the driver after the
    /// stop phase. Task bodies should derive from it or observe it directly.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Returns the active panic-handling mode.
    pub fn panic_mode(&self) -> PanicMode {
        self.mode
    }

    /// True when the version tag selects development mode.
    pub fn is_dev_version(&self) -> bool {
        self.cfg.is_dev_version()
    }

    /// True when the version tag selects test mode.
    pub fn is_test_version(&self) -> bool {
        self.cfg.is_test_version()
    }

    /// True when the version tag selects production mode.
    pub fn is_prod_version(&self) -> bool {
        self.cfg.is_prod_version()
    }

    // ---------------------------
    // Lifecycle integration
    // ---------------------------

    /// Opts a component into the Start/Stop lifecycle.
    ///
    /// Hooks run in registration order on boot and in exact reverse order on
    /// shutdown; call this from the component's constructor so registration
    /// order equals construction order.
    pub fn register_component(&self, component: Arc<dyn Component>) {
        self.lifecycle.append(component);
    }

    /// Registers a named callback to run once all components have started.
    ///
    /// Callbacks are executed through [`spawn`](Supervisor::spawn); a failure
    /// is logged as a warning and never affects boot.
    pub fn register_ready_callback<F, Fut>(&self, name: impl Into<String>, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.ready_callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ReadyCallback {
                name: name.into(),
                run: Box::new(move || Box::pin(callback())),
            });
    }

    /// Fires all registered ready callbacks (each at most once).
    ///
    /// The driver calls this right after a successful start phase.
    pub fn execute_ready_callbacks(&self) {
        let callbacks = std::mem::take(
            &mut *self
                .ready_callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for callback in callbacks {
            let name = callback.name;
            self.spawn(async move {
                match (callback.run)().await {
                    Ok(()) => info!(callback = %name, "executed app ready callback"),
                    Err(err) => warn!(callback = %name, err = %err, "app ready callback failed"),
                }
            });
        }
    }

    /// Requests process shutdown, as a component would on a fatal condition.
    ///
    /// The driver reacts exactly as it does to an OS termination signal.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ---------------------------
    // Panic-safe execution
    // ---------------------------

    /// Spawns a panic-safe task.
    ///
    /// A panic is recovered and logged with its message and backtrace; the
    /// caller is unaffected. In development mode the panic propagates into
    /// the runtime instead (visible on the returned [`JoinHandle`]).
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mode = self.mode;
        tokio::spawn(async move {
            if let Err(panic) = recover::guard_future(mode, future).await {
                error!(err = %panic, backtrace = %panic.backtrace, "supervised task panicked");
            }
        })
    }

    /// Spawns a panic-safe task registered with the shutdown wait-group.
    ///
    /// The driver waits (bounded) for persistent tasks to finish after the
    /// stop phase; bodies should observe [`token`](Supervisor::token) and
    /// return once it is canceled.
    pub fn spawn_persistent<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mode = self.mode;
        let tracked = self.tracker.track_future(async move {
            if let Err(panic) = recover::guard_future(mode, future).await {
                error!(err = %panic, backtrace = %panic.backtrace, "persistent task panicked");
            }
        });
        tokio::spawn(tracked)
    }

    /// Runs a closure under the panic guard.
    ///
    /// Production mode converts a panic into [`TaskError::Panic`] carrying
    /// the message and backtrace; development mode re-propagates it.
    pub fn recover_execute<T, F>(&self, executor: F) -> Result<T, TaskError>
    where
        F: FnOnce() -> Result<T, TaskError>,
    {
        match recover::guard_call(self.mode, executor) {
            Ok(result) => result,
            Err(panic) => Err(TaskError::Panic(panic)),
        }
    }

    /// Async twin of [`recover_execute`](Supervisor::recover_execute).
    pub async fn recover_execute_async<T, Fut>(&self, future: Fut) -> Result<T, TaskError>
    where
        Fut: Future<Output = Result<T, TaskError>>,
    {
        match recover::guard_future(self.mode, future).await {
            Ok(result) => result,
            Err(panic) => Err(TaskError::Panic(panic)),
        }
    }

    // ---------------------------
    // Scheduled tasks
    // ---------------------------

    /// Starts a ticking task derived from the root context.
    ///
    /// The body runs on each tick (first tick one full interval after spawn)
    /// under the panic guard. See [`ScheduledTaskHandle`] for the
    /// pause/resume/cancel contract.
    ///
    /// ### Parameters
    /// - `persistent`: register with the shutdown wait-group
    /// - `every`: tick interval; ticks missed while the body runs are skipped
    pub fn run_scheduled_task<B, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        persistent: bool,
        every: Duration,
        body: B,
    ) -> ScheduledTaskHandle
    where
        B: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<TaskControl, TaskError>> + Send + 'static,
    {
        self.run_scheduled_task_with_parent(&self.root, name, persistent, every, body)
    }

    /// Starts a ticking task whose context derives from `parent` instead of
    /// the root token.
    pub fn run_scheduled_task_with_parent<B, Fut>(
        &self,
        parent: &CancellationToken,
        name: impl Into<Arc<str>>,
        persistent: bool,
        every: Duration,
        body: B,
    ) -> ScheduledTaskHandle
    where
        B: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<TaskControl, TaskError>> + Send + 'static,
    {
        let handle =
            ScheduledTaskHandle::new(name.into(), parent.child_token(), self.cfg.cancel_wait);
        self.spawn_runner(
            persistent,
            scheduled::drive(handle.clone(), every, self.mode, body),
        );
        handle
    }

    /// Starts a ticking task after a one-time prepare step.
    ///
    /// A prepare failure cancels the derived context and returns
    /// [`TaskError::Prepare`]; no task is spawned.
    pub async fn run_scheduled_task_with_prepare<P, PFut, B, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        persistent: bool,
        every: Duration,
        prepare: P,
        body: B,
    ) -> Result<ScheduledTaskHandle, TaskError>
    where
        P: FnOnce(CancellationToken) -> PFut,
        PFut: Future<Output = Result<(), BoxError>>,
        B: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<TaskControl, TaskError>> + Send + 'static,
    {
        let name = name.into();
        let handle =
            ScheduledTaskHandle::new(name.clone(), self.root.child_token(), self.cfg.cancel_wait);
        if let Err(source) = prepare(handle.token()).await {
            handle.abort_before_spawn();
            return Err(TaskError::Prepare {
                task: name.to_string(),
                source,
            });
        }
        self.spawn_runner(
            persistent,
            scheduled::drive(handle.clone(), every, self.mode, body),
        );
        Ok(handle)
    }

    // ---------------------------
    // Polling tasks
    // ---------------------------

    /// Starts a tight-loop task derived from the root context.
    ///
    /// The body is re-invoked back-to-back under the panic guard until it
    /// returns [`TaskControl::Stop`], reports cancellation, or the context is
    /// canceled. See [`PollingTaskHandle`] for the cancel contract.
    pub fn run_polling_task<B, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        persistent: bool,
        body: B,
    ) -> PollingTaskHandle
    where
        B: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<TaskControl, TaskError>> + Send + 'static,
    {
        let handle = PollingTaskHandle::new(
            name.into(),
            self.root.child_token(),
            self.cfg.cancel_wait,
            CleanupSlot::empty(),
        );
        self.spawn_runner(persistent, polling::drive(handle.clone(), self.mode, body));
        handle
    }

    /// Starts a tight-loop task after a one-time prepare step that may return
    /// a cleanup callback.
    ///
    /// The cleanup runs exactly once — on loop exit, on `cancel()`, or on
    /// whichever of the two happens first when they race. A prepare failure
    /// cancels the derived context and returns [`TaskError::Prepare`].
    pub async fn run_polling_task_with_prepare<P, PFut, B, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        persistent: bool,
        prepare: P,
        body: B,
    ) -> Result<PollingTaskHandle, TaskError>
    where
        P: FnOnce(CancellationToken) -> PFut,
        PFut: Future<Output = Result<Option<Cleanup>, BoxError>>,
        B: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<TaskControl, TaskError>> + Send + 'static,
    {
        let name = name.into();
        let token = self.root.child_token();
        let cleanup = match prepare(token.clone()).await {
            Ok(cleanup) => cleanup,
            Err(source) => {
                token.cancel();
                return Err(TaskError::Prepare {
                    task: name.to_string(),
                    source,
                });
            }
        };
        let handle = PollingTaskHandle::new(
            name,
            token,
            self.cfg.cancel_wait,
            CleanupSlot::holding(cleanup),
        );
        self.spawn_runner(persistent, polling::drive(handle.clone(), self.mode, body));
        Ok(handle)
    }

    fn spawn_runner<F>(&self, persistent: bool, runner: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if persistent {
            self.spawn_persistent(runner);
        } else {
            self.spawn(runner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::core::AppBuilder;

    fn supervisor(version: &str) -> Arc<Supervisor> {
        let app = AppBuilder::new(RuntimeConfig::new(version, 0))
            .build()
            .expect("empty graph builds");
        Arc::clone(app.supervisor())
    }

    #[tokio::test]
    async fn test_spawn_recovers_panic_in_production_mode() {
        let supervisor = supervisor("test");
        let handle = supervisor.spawn(async { panic!("worker exploded") });
        // The guard swallows the panic: the wrapper task finishes cleanly.
        assert!(handle.await.is_ok());

        // And the runtime is still healthy enough to run more work.
        let done = Arc::new(AtomicUsize::new(0));
        let done_in_task = Arc::clone(&done);
        supervisor
            .spawn(async move {
                done_in_task.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .expect("healthy task joins");
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_propagates_panic_in_dev_mode() {
        let supervisor = supervisor("dev");
        let handle = supervisor.spawn(async { panic!("dev crash") });
        let join_err = handle.await.unwrap_err();
        assert!(join_err.is_panic());
    }

    #[tokio::test]
    async fn test_recover_execute_reports_message_and_backtrace() {
        let supervisor = supervisor("prod");
        let err = supervisor
            .recover_execute(|| -> Result<(), TaskError> { panic!("prod panic payload") })
            .unwrap_err();
        match err {
            TaskError::Panic(panic) => {
                assert!(panic.message.contains("prod panic payload"));
                assert!(!panic.backtrace.is_empty());
            }
            other => panic!("expected panic error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_recover_execute_propagates_in_dev_mode() {
        let supervisor = supervisor("dev");
        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = supervisor.recover_execute(|| -> Result<(), TaskError> { panic!("loud") });
        }));
        assert!(unwound.is_err());
    }

    #[tokio::test]
    async fn test_ready_callbacks_fire_once() {
        let supervisor = supervisor("test");
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_callback = Arc::clone(&fired);
        supervisor.register_ready_callback("warmup", move || async move {
            fired_in_callback.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        supervisor.execute_ready_callbacks();
        supervisor.execute_ready_callbacks(); // second call finds an empty list

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
