//! # Typed dependency graph resolution.
//!
//! Providers declare their dependencies as [`Dep`] entries (one `TypeId` plus
//! the type name for diagnostics). [`sort`] validates the graph and returns a
//! construction order:
//!
//! - a type provided twice → [`GraphError::Duplicate`]
//! - a dependency with no provider and no supplied value → [`GraphError::Unsatisfied`]
//! - providers that depend on themselves → [`GraphError::Cycle`]
//!
//! ## Rules
//! - Supplied values are roots: they satisfy dependencies but are never sorted.
//! - Among simultaneously-ready providers, registration order is preserved,
//!   so a graph registered in dependency order constructs in that same order.
//! - Everything is checked here, at build time — never at first use.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{BuildError, GraphError};

/// Type-erased shared component value.
pub(crate) type Shared = Arc<dyn Any + Send + Sync>;

/// A declared dependency on another provided (or supplied) type.
#[derive(Clone, Copy, Debug)]
pub struct Dep {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
}

impl Dep {
    /// Declares a dependency on `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// A registered constructor together with its typed declaration.
pub(crate) struct Provider {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) deps: Vec<Dep>,
    pub(crate) construct: Box<dyn FnOnce(&Resolver) -> Result<Shared, BuildError> + Send>,
}

/// Read-only view handed to a running constructor.
///
/// Access is restricted to the constructor's *declared* dependencies; fetching
/// anything else yields [`GraphError::Undeclared`]. Declared dependencies are
/// always present because the graph is validated before any constructor runs.
pub struct Resolver<'a> {
    pub(crate) store: &'a HashMap<TypeId, Shared>,
    pub(crate) allowed: &'a [Dep],
    pub(crate) component: &'static str,
}

impl Resolver<'_> {
    /// Fetches a declared dependency.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, GraphError> {
        let id = TypeId::of::<T>();
        if !self.allowed.iter().any(|d| d.id == id) {
            return Err(GraphError::Undeclared {
                type_name: std::any::type_name::<T>(),
                component: self.component,
            });
        }
        self.store
            .get(&id)
            .cloned()
            .and_then(|shared| shared.downcast::<T>().ok())
            .ok_or(GraphError::Unsatisfied {
                type_name: std::any::type_name::<T>(),
                required_by: self.component,
            })
    }
}

/// Validates the graph and returns provider indices in construction order.
pub(crate) fn sort(
    providers: &[Provider],
    supplied: &HashSet<TypeId>,
) -> Result<Vec<usize>, GraphError> {
    let mut by_id: HashMap<TypeId, usize> = HashMap::with_capacity(providers.len());
    for (i, p) in providers.iter().enumerate() {
        if supplied.contains(&p.id) || by_id.insert(p.id, i).is_some() {
            return Err(GraphError::Duplicate { type_name: p.name });
        }
    }

    for p in providers {
        for dep in &p.deps {
            if !supplied.contains(&dep.id) && !by_id.contains_key(&dep.id) {
                return Err(GraphError::Unsatisfied {
                    type_name: dep.name,
                    required_by: p.name,
                });
            }
        }
    }

    // Repeated registration-order scans: within one scan a whole ready chain
    // resolves, so graphs registered in dependency order keep that order.
    let mut order = Vec::with_capacity(providers.len());
    let mut done = vec![false; providers.len()];
    while order.len() < providers.len() {
        let before = order.len();
        for (i, p) in providers.iter().enumerate() {
            if done[i] {
                continue;
            }
            let ready = p
                .deps
                .iter()
                .all(|d| supplied.contains(&d.id) || by_id.get(&d.id).is_some_and(|&j| done[j]));
            if ready {
                done[i] = true;
                order.push(i);
            }
        }
        if order.len() == before {
            let members = providers
                .iter()
                .enumerate()
                .filter(|(i, _)| !done[*i])
                .map(|(_, p)| p.name)
                .collect();
            return Err(GraphError::Cycle { members });
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;
    struct C;

    fn provider<T: Send + Sync + 'static>(deps: Vec<Dep>) -> Provider {
        Provider {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            deps,
            construct: Box::new(|_| unreachable!("sort does not construct")),
        }
    }

    #[test]
    fn test_chain_keeps_registration_order() {
        let providers = vec![
            provider::<A>(vec![]),
            provider::<B>(vec![Dep::of::<A>()]),
            provider::<C>(vec![Dep::of::<B>()]),
        ];
        let order = sort(&providers, &HashSet::new()).expect("acyclic graph");
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_reversed_registration_resolves_to_dependency_order() {
        let providers = vec![
            provider::<C>(vec![Dep::of::<B>()]),
            provider::<B>(vec![Dep::of::<A>()]),
            provider::<A>(vec![]),
        ];
        let order = sort(&providers, &HashSet::new()).expect("acyclic graph");
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_duplicate_detected() {
        let providers = vec![provider::<A>(vec![]), provider::<A>(vec![])];
        let err = sort(&providers, &HashSet::new()).unwrap_err();
        assert!(matches!(err, GraphError::Duplicate { .. }), "got {err}");
    }

    #[test]
    fn test_unsatisfied_detected() {
        let providers = vec![provider::<B>(vec![Dep::of::<A>()])];
        let err = sort(&providers, &HashSet::new()).unwrap_err();
        assert!(matches!(err, GraphError::Unsatisfied { .. }), "got {err}");
    }

    #[test]
    fn test_supplied_satisfies_dependency() {
        let providers = vec![provider::<B>(vec![Dep::of::<A>()])];
        let supplied: HashSet<TypeId> = [TypeId::of::<A>()].into();
        assert_eq!(sort(&providers, &supplied).expect("supplied root"), vec![0]);
    }

    #[test]
    fn test_cycle_names_members() {
        let providers = vec![
            provider::<A>(vec![Dep::of::<B>()]),
            provider::<B>(vec![Dep::of::<A>()]),
        ];
        match sort(&providers, &HashSet::new()).unwrap_err() {
            GraphError::Cycle { members } => assert_eq!(members.len(), 2),
            other => panic!("expected cycle, got {other}"),
        }
    }
}
