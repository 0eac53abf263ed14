//! # chassis
//!
//! **Chassis** is a component-lifecycle and background-task supervision
//! framework for long-running services.
//!
//! It provides the reusable core every service built on this scaffold shares:
//! ordered startup/shutdown of modular components, panic-safe task spawning,
//! cancelable scheduled/polling background tasks, and a reference-counted
//! per-key mutex.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │  provider A  │   │  provider B  │   │  provider C  │
//!   │ (module ctor)│   │ (deps: [A])  │   │ (deps: [B])  │
//!   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!          ▼                  ▼                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  AppBuilder (per-process registry)                          │
//! │  - typed dependency declarations (Dep::of::<T>())           │
//! │  - topological resolution: Duplicate / Unsatisfied / Cycle  │
//! │  - constructors run in dependency order                     │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  App (driver)                     Supervisor (shared)       │
//! │  - start hooks, in order  ◄────── register_component()      │
//! │  - wait: OS signal | shutdown() ◄ shutdown()                │
//! │  - stop hooks, exact reverse      spawn / spawn_persistent  │
//! │  - drain persistent tasks ◄────── TaskTracker (wait-group)  │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                ▼
//!              scheduled tasks         polling tasks
//!              (tick, pause/resume)    (tight loop, prepare/cleanup)
//!              both: derived CancellationToken + bounded cancel()
//! ```
//!
//! ### Lifecycle
//! ```text
//! AppBuilder::build()
//!   └─► constructors (topological order) ─► register_component()
//! App::run()
//!   ├─► start hooks, registration order      (bounded, fail-fast)
//!   ├─► ready callbacks (supervised, fire-and-forget)
//!   ├─► wait for SIGINT/SIGTERM/SIGQUIT or Supervisor::shutdown()
//!   ├─► stop hooks, exact reverse order      (bounded, best-effort)
//!   └─► cancel root token ─► drain persistent tasks (bounded, warn on overrun)
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types                                        |
//! |-------------------|-------------------------------------------------------------------|--------------------------------------------------|
//! | **Registry**      | Typed providers, build-time graph checks.                         | [`AppBuilder`], [`Dep`], [`Resolver`]            |
//! | **Lifecycle**     | Ordered, timeout-bounded Start/Stop hooks.                        | [`Component`], [`App`]                           |
//! | **Supervision**   | Panic-safe spawning, shutdown wait-group, recover-execute.        | [`Supervisor`], [`PanicMode`]                    |
//! | **Tasks**         | Scheduled (tick) and polling (tight-loop) runners with cancel.    | [`ScheduledTaskHandle`], [`PollingTaskHandle`]   |
//! | **Key mutex**     | Pooled, reference-counted per-key exclusion.                      | [`KeyMutex`], [`KeyGuard`]                       |
//! | **Errors**        | Typed build/lifecycle/panic/task errors.                          | [`BuildError`], [`LifecycleError`], [`TaskError`]|
//!
//! ## Optional features
//! - `logging`: exports [`logging::init`], a `tracing-subscriber` bootstrap
//!   for binaries without a subscriber of their own.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use chassis::{
//!     AppBuilder, BoxError, Component, Dep, RuntimeConfig, Supervisor, TaskControl,
//! };
//!
//! struct Heartbeat {
//!     supervisor: Arc<Supervisor>,
//! }
//!
//! #[async_trait]
//! impl Component for Heartbeat {
//!     fn name(&self) -> &str {
//!         "heartbeat"
//!     }
//!
//!     async fn start(&self) -> Result<(), BoxError> {
//!         self.supervisor.run_scheduled_task(
//!             "heartbeat-tick",
//!             true,
//!             Duration::from_secs(30),
//!             |_token| async {
//!                 // emit liveness...
//!                 Ok(TaskControl::Continue)
//!             },
//!         );
//!         Ok(())
//!     }
//!
//!     async fn stop(&self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let app = AppBuilder::new(RuntimeConfig::new("prod", 0))
//!         .provide(vec![Dep::of::<Supervisor>()], |r| {
//!             let supervisor = r.get::<Supervisor>()?;
//!             let heartbeat = Arc::new(Heartbeat { supervisor });
//!             heartbeat.supervisor.register_component(heartbeat.clone());
//!             Ok(heartbeat)
//!         })
//!         .build()?;
//!     std::process::exit(app.run().await);
//! }
//! ```

mod config;
mod core;
mod error;
mod supervisor;
mod sync;
mod tasks;

// ---- Public re-exports ----

pub use config::RuntimeConfig;
pub use core::{App, AppBuilder, Component, Dep, Resolver};
pub use error::{BoxError, BuildError, GraphError, LifecycleError, PanicError, TaskError};
pub use supervisor::{PanicMode, Supervisor};
pub use sync::{KeyGuard, KeyMutex};
pub use tasks::{Cleanup, PollingTaskHandle, ScheduledTaskHandle, TaskControl, TaskState};

// Optional: tracing-subscriber bootstrap for binaries.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub mod logging;
