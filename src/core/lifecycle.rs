//! # Lifecycle coordinator: ordered, logged Start/Stop hooks.
//!
//! Records one hook per registered [`Component`]. The driver runs Start hooks
//! in registration order (which equals construction order) and Stop hooks in
//! exact reverse — restricted to the prefix whose Start actually succeeded.
//!
//! ## Rules
//! - Start: fail-fast. The first error aborts the phase and is returned with
//!   the component's name attached.
//! - Stop: best-effort. Every eligible hook runs; each failure is logged and
//!   the first one is returned as representative.
//! - Each hook logs the component name and elapsed duration.
//! - The wall-clock phase bound is applied by the driver, not here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;
use tracing::{error, info};

use crate::core::component::Component;
use crate::error::LifecycleError;

/// Ordered hook list shared between the supervisor (registration side) and
/// the app driver (execution side).
pub struct Lifecycle {
    hooks: Mutex<Vec<Arc<dyn Component>>>,
    started: AtomicUsize,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
        }
    }

    /// Appends a hook. Called from component constructors during build.
    pub(crate) fn append(&self, component: Arc<dyn Component>) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(component);
    }

    fn snapshot(&self) -> Vec<Arc<dyn Component>> {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs all Start hooks in registration order, fail-fast.
    ///
    /// Tracks how many hooks succeeded so [`stop_all`](Self::stop_all) can
    /// later stop exactly that prefix.
    pub(crate) async fn start_all(&self) -> Result<(), LifecycleError> {
        for component in self.snapshot() {
            let begin = Instant::now();
            if let Err(source) = component.start().await {
                return Err(LifecycleError::Start {
                    component: component.name().to_string(),
                    source,
                });
            }
            self.started.fetch_add(1, Ordering::SeqCst);
            info!(
                component = component.name(),
                time_cost = ?begin.elapsed(),
                "component started"
            );
        }
        Ok(())
    }

    /// Runs Stop hooks for the started prefix, in exact reverse order.
    ///
    /// Best-effort: a failing hook is logged and the remaining hooks still
    /// run. Returns the first failure, if any.
    pub(crate) async fn stop_all(&self) -> Result<(), LifecycleError> {
        let hooks = self.snapshot();
        let started = self.started.swap(0, Ordering::SeqCst).min(hooks.len());

        let mut first_failure = None;
        for component in hooks[..started].iter().rev() {
            let begin = Instant::now();
            match component.stop().await {
                Ok(()) => info!(
                    component = component.name(),
                    time_cost = ?begin.elapsed(),
                    "component stopped"
                ),
                Err(source) => {
                    let failure = LifecycleError::Stop {
                        component: component.name().to_string(),
                        source,
                    };
                    error!(component = component.name(), err = %failure, "component stop failed");
                    first_failure.get_or_insert(failure);
                }
            }
        }
        match first_failure {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    use crate::error::BoxError;

    struct Probe {
        tag: &'static str,
        fail_start: bool,
        fail_stop: bool,
        log: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Component for Probe {
        fn name(&self) -> &str {
            self.tag
        }

        async fn start(&self) -> Result<(), BoxError> {
            if self.fail_start {
                return Err(format!("{} refused to start", self.tag).into());
            }
            self.log.lock().expect("log").push(format!("start:{}", self.tag));
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            if self.fail_stop {
                return Err(format!("{} refused to stop", self.tag).into());
            }
            self.log.lock().expect("log").push(format!("stop:{}", self.tag));
            Ok(())
        }
    }

    fn probe(tag: &'static str, log: &Arc<StdMutex<Vec<String>>>) -> Arc<Probe> {
        Arc::new(Probe {
            tag,
            fail_start: false,
            fail_stop: false,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn test_stop_order_is_exact_reverse_of_start() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let lifecycle = Lifecycle::new();
        for tag in ["a", "b", "c"] {
            lifecycle.append(probe(tag, &log));
        }

        lifecycle.start_all().await.expect("all start");
        lifecycle.stop_all().await.expect("all stop");

        assert_eq!(
            *log.lock().expect("log"),
            vec!["start:a", "start:b", "start:c", "stop:c", "stop:b", "stop:a"]
        );
    }

    #[tokio::test]
    async fn test_start_failure_stops_only_started_prefix() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let lifecycle = Lifecycle::new();
        lifecycle.append(probe("a", &log));
        lifecycle.append(Arc::new(Probe {
            tag: "b",
            fail_start: true,
            fail_stop: false,
            log: Arc::clone(&log),
        }));
        lifecycle.append(probe("c", &log));

        let err = lifecycle.start_all().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Start { ref component, .. } if component == "b"));

        lifecycle.stop_all().await.expect("prefix stop");
        assert_eq!(*log.lock().expect("log"), vec!["start:a", "stop:a"]);
    }

    #[tokio::test]
    async fn test_stop_is_best_effort() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let lifecycle = Lifecycle::new();
        lifecycle.append(probe("a", &log));
        lifecycle.append(Arc::new(Probe {
            tag: "b",
            fail_start: false,
            fail_stop: true,
            log: Arc::clone(&log),
        }));
        lifecycle.append(probe("c", &log));

        lifecycle.start_all().await.expect("all start");
        let err = lifecycle.stop_all().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Stop { ref component, .. } if component == "b"));

        // a still stopped even though b failed first
        assert!(log.lock().expect("log").contains(&"stop:a".to_string()));
    }
}
