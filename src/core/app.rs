//! # App driver: boot, wait, shut down, drain.
//!
//! [`App`] owns the built object graph and drives the process lifecycle:
//!
//! ```text
//! run()
//!  ├─► start phase    lifecycle.start_all()       (bounded: lifecycle_timeout)
//!  │      └─ failure → stop started prefix → exit 1
//!  ├─► execute app-ready callbacks (fire-and-forget, supervised)
//!  ├─► wait           OS termination signal | Supervisor::shutdown()
//!  ├─► stop phase     lifecycle.stop_all()        (bounded: lifecycle_timeout)
//!  │      └─ failure → exit 1 (after the drain below)
//!  └─► drain          cancel root token, close tracker,
//!                     wait for persistent tasks   (bounded: lifecycle_timeout,
//!                     overrun degrades to a warning)
//! ```
//!
//! ## Rules
//! - The drain runs on **every** exit path, including start failure.
//! - A phase that overruns its bound is reported as `PhaseTimeout` and is
//!   fatal (non-zero exit code); the drain overrun is only warned about.
//! - `run()` is meant to be called once per process run.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::RuntimeConfig;
use crate::core::graph::Shared;
use crate::core::lifecycle::Lifecycle;
use crate::core::shutdown;
use crate::error::LifecycleError;
use crate::supervisor::Supervisor;

/// Handle to the fully-built application graph.
///
/// Returned by [`AppBuilder::build`](crate::AppBuilder::build); exposes the
/// built components and the [`run`](App::run) driver.
pub struct App {
    cfg: RuntimeConfig,
    supervisor: Arc<Supervisor>,
    lifecycle: Arc<Lifecycle>,
    root: CancellationToken,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    components: HashMap<TypeId, Shared>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("components", &self.components.len())
            .finish_non_exhaustive()
    }
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cfg: RuntimeConfig,
        supervisor: Arc<Supervisor>,
        lifecycle: Arc<Lifecycle>,
        root: CancellationToken,
        shutdown: CancellationToken,
        tracker: TaskTracker,
        components: HashMap<TypeId, Shared>,
    ) -> Self {
        Self {
            cfg,
            supervisor,
            lifecycle,
            root,
            shutdown,
            tracker,
            components,
        }
    }

    /// Returns the supervisor shared with all components.
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Fetches a built (or supplied) component by type.
    pub fn component<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.components
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|shared| shared.downcast::<T>().ok())
    }

    /// Drives the whole process lifecycle and returns the exit code.
    ///
    /// Blocks until an OS termination signal arrives or a component triggers
    /// [`Supervisor::shutdown`]. The persistent-task drain runs on every exit
    /// path.
    pub async fn run(&self) -> i32 {
        let exit_code = self.run_phases().await;
        self.drain().await;
        exit_code
    }

    async fn run_phases(&self) -> i32 {
        if let Err(err) = self.bounded("start", self.lifecycle.start_all()).await {
            error!(err = %err, "start components failed");
            // Components that did start still get their Stop hooks.
            if let Err(err) = self.bounded("stop", self.lifecycle.stop_all()).await {
                error!(err = %err, "stop components failed");
            }
            return 1;
        }
        info!(
            version = %self.cfg.version,
            node_index = self.cfg.node_index,
            "all components started"
        );
        self.supervisor.execute_ready_callbacks();

        tokio::select! {
            received = shutdown::wait_for_termination_signal() => {
                match received {
                    Ok(()) => info!("received exit signal"),
                    Err(err) => error!(err = %err, "signal listener failed; shutting down"),
                }
            }
            _ = self.shutdown.cancelled() => {
                info!("shutdown triggered by component");
            }
        }

        if let Err(err) = self.bounded("stop", self.lifecycle.stop_all()).await {
            error!(err = %err, "stop components failed");
            return 1;
        }
        0
    }

    /// Applies the phase bound, mapping an overrun to [`LifecycleError::PhaseTimeout`].
    async fn bounded<F>(&self, phase: &'static str, run: F) -> Result<(), LifecycleError>
    where
        F: Future<Output = Result<(), LifecycleError>>,
    {
        let timeout = self.cfg.lifecycle_timeout;
        match time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_elapsed) => Err(LifecycleError::PhaseTimeout { phase, timeout }),
        }
    }

    /// Cancels the root context and waits (bounded) for persistent tasks.
    async fn drain(&self) {
        self.root.cancel();
        self.tracker.close();
        if time::timeout(self.cfg.lifecycle_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.cfg.lifecycle_timeout,
                "wait for persistent tasks to terminate timed out"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::core::builder::AppBuilder;
    use crate::core::component::Component;
    use crate::core::graph::Dep;
    use crate::error::BoxError;

    struct Recorder {
        tag: &'static str,
        fail_start: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Component for Recorder {
        fn name(&self) -> &str {
            self.tag
        }

        async fn start(&self) -> Result<(), BoxError> {
            if self.fail_start {
                return Err(format!("{} exploded", self.tag).into());
            }
            self.log.lock().expect("log").push(format!("start:{}", self.tag));
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            self.log.lock().expect("log").push(format!("stop:{}", self.tag));
            Ok(())
        }
    }

    // One marker type per provider: the graph is keyed by type.
    struct CompA(#[allow(dead_code)] Arc<Recorder>);
    struct CompB(#[allow(dead_code)] Arc<Recorder>);
    struct CompC(#[allow(dead_code)] Arc<Recorder>);

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &'static str,
        fail: Option<&'static str>,
    ) -> Arc<Recorder> {
        Arc::new(Recorder {
            tag,
            fail_start: fail == Some(tag),
            log: Arc::clone(log),
        })
    }

    fn recording_app(log: &Arc<Mutex<Vec<String>>>, fail: Option<&'static str>) -> App {
        let (log_a, log_b, log_c) = (Arc::clone(log), Arc::clone(log), Arc::clone(log));
        AppBuilder::new(RuntimeConfig::new("test", 0))
            .provide(vec![Dep::of::<Supervisor>()], move |r| {
                let supervisor = r.get::<Supervisor>()?;
                let component = recorder(&log_a, "a", fail);
                supervisor.register_component(component.clone());
                Ok(Arc::new(CompA(component)))
            })
            .provide(vec![Dep::of::<Supervisor>(), Dep::of::<CompA>()], move |r| {
                let supervisor = r.get::<Supervisor>()?;
                let component = recorder(&log_b, "b", fail);
                supervisor.register_component(component.clone());
                Ok(Arc::new(CompB(component)))
            })
            .provide(vec![Dep::of::<Supervisor>(), Dep::of::<CompB>()], move |r| {
                let supervisor = r.get::<Supervisor>()?;
                let component = recorder(&log_c, "c", fail);
                supervisor.register_component(component.clone());
                Ok(Arc::new(CompC(component)))
            })
            .build()
            .expect("graph builds")
    }

    #[tokio::test]
    async fn test_run_starts_in_order_and_stops_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = recording_app(&log, None);
        let supervisor = Arc::clone(app.supervisor());

        let driver = tokio::spawn(async move { app.run().await });
        // Let the start phase finish, then ask for shutdown like a component would.
        tokio::time::sleep(Duration::from_millis(50)).await;
        supervisor.shutdown();

        let exit_code = driver.await.expect("driver join");
        assert_eq!(exit_code, 0);
        assert_eq!(
            *log.lock().expect("log"),
            vec!["start:a", "start:b", "start:c", "stop:c", "stop:b", "stop:a"]
        );
    }

    #[tokio::test]
    async fn test_start_failure_exits_nonzero_and_unwinds_prefix() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = recording_app(&log, Some("b"));

        let exit_code = app.run().await;
        assert_eq!(exit_code, 1);
        assert_eq!(*log.lock().expect("log"), vec!["start:a", "stop:a"]);
    }

    #[tokio::test]
    async fn test_persistent_task_drained_at_exit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = recording_app(&log, None);
        let supervisor = Arc::clone(app.supervisor());

        let drained = Arc::new(Mutex::new(false));
        let drained_in_task = Arc::clone(&drained);
        let token = supervisor.token();
        supervisor.spawn_persistent(async move {
            token.cancelled().await;
            *drained_in_task.lock().expect("flag") = true;
        });

        let driver = tokio::spawn(async move { app.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        supervisor.shutdown();

        assert_eq!(driver.await.expect("driver join"), 0);
        assert!(*drained.lock().expect("flag"), "persistent task saw root cancel before exit");
    }

    #[test]
    fn test_component_lookup_misses_unknown_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = recording_app(&log, None);
        assert!(app.component::<String>().is_none());
        assert!(app.component::<Supervisor>().is_some());
    }
}
