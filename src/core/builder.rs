//! # AppBuilder: per-process component registry and object-graph builder.
//!
//! One builder is constructed per process run (or per test) — there is no
//! global constructor list. Modules contribute typed providers via
//! [`AppBuilder::provide`]; pre-built collaborators (config objects, clients)
//! enter via [`AppBuilder::supply`].
//!
//! ## Build flow
//! ```text
//! AppBuilder::new(cfg)
//!   ├─► supply(value)            (roots: satisfy deps, never constructed)
//!   ├─► provide::<T>(deps, ctor) (typed provider, declared dependencies)
//!   └─► build()
//!         ├─► wire runtime: root token, shutdown trigger, tracker,
//!         │   Lifecycle, Supervisor (auto-supplied as Arc<Supervisor>)
//!         ├─► graph::sort()  → Duplicate / Unsatisfied / Cycle checks
//!         ├─► run constructors in construction order, each with a Resolver
//!         │   restricted to its declared deps
//!         └─► App { components, lifecycle, supervisor, ... }
//! ```
//!
//! ## Rules
//! - Constructors register lifecycle hooks while they run, so hook order
//!   equals construction order — which the driver relies on for reverse stop.
//! - A constructor error aborts the build with the component's name attached.
//! - Nothing is resolved lazily: every graph defect surfaces in `build()`.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::RuntimeConfig;
use crate::core::app::App;
use crate::core::graph::{self, Dep, Provider, Resolver, Shared};
use crate::core::lifecycle::Lifecycle;
use crate::error::{BoxError, BuildError, GraphError};
use crate::supervisor::Supervisor;

/// Collects typed providers and supplied values, then builds the [`App`].
pub struct AppBuilder {
    cfg: RuntimeConfig,
    providers: Vec<Provider>,
    supplied: Vec<(TypeId, &'static str, Shared)>,
}

impl AppBuilder {
    /// Creates an empty builder for one process run.
    pub fn new(cfg: RuntimeConfig) -> Self {
        Self {
            cfg,
            providers: Vec::new(),
            supplied: Vec::new(),
        }
    }

    /// Seeds the graph with a pre-built value.
    ///
    /// Supplied values satisfy dependencies but have no constructor and no
    /// lifecycle of their own.
    pub fn supply<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.supplied.push((
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Arc::new(value) as Shared,
        ));
        self
    }

    /// Registers a typed provider for `T`.
    ///
    /// ### Parameters
    /// - `deps`: the dependencies the constructor will fetch from its
    ///   [`Resolver`]; fetching anything undeclared fails the build
    /// - `ctor`: runs during `build()`, after all of `deps` were constructed
    ///
    /// Components that want Start/Stop hooks depend on [`Supervisor`] and call
    /// [`register_component`](Supervisor::register_component) inside `ctor`.
    pub fn provide<T, F>(mut self, deps: Vec<Dep>, ctor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnOnce(&Resolver) -> Result<Arc<T>, BoxError> + Send + 'static,
    {
        self.providers.push(Provider {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            deps,
            construct: Box::new(move |resolver| {
                ctor(resolver)
                    .map(|component| component as Shared)
                    .map_err(|source| BuildError::Constructor {
                        component: std::any::type_name::<T>(),
                        source,
                    })
            }),
        });
        self
    }

    /// Resolves the graph, runs all constructors, and returns the [`App`].
    pub fn build(self) -> Result<App, BuildError> {
        let Self {
            cfg,
            providers,
            supplied,
        } = self;

        let root = CancellationToken::new();
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let lifecycle = Arc::new(Lifecycle::new());
        let supervisor = Arc::new(Supervisor::new(
            cfg.clone(),
            root.clone(),
            shutdown.clone(),
            tracker.clone(),
            Arc::clone(&lifecycle),
        ));

        let mut store: HashMap<TypeId, Shared> = HashMap::new();
        let mut supplied_ids: HashSet<TypeId> = HashSet::new();
        let mut seed = |id: TypeId, name: &'static str, value: Shared| {
            if !supplied_ids.insert(id) {
                return Err(GraphError::Duplicate { type_name: name });
            }
            store.insert(id, value);
            Ok(())
        };
        seed(
            TypeId::of::<Supervisor>(),
            std::any::type_name::<Supervisor>(),
            Arc::clone(&supervisor) as Shared,
        )?;
        for (id, name, value) in supplied {
            seed(id, name, value)?;
        }

        let order = graph::sort(&providers, &supplied_ids)?;
        let mut providers: Vec<Option<Provider>> = providers.into_iter().map(Some).collect();
        for idx in order {
            let Some(provider) = providers[idx].take() else {
                continue;
            };
            let resolver = Resolver {
                store: &store,
                allowed: &provider.deps,
                component: provider.name,
            };
            let value = (provider.construct)(&resolver)?;
            store.insert(provider.id, value);
        }

        Ok(App::new(
            cfg, supervisor, lifecycle, root, shutdown, tracker, store,
        ))
    }
}
