//! Hierarchical, lazily-populated container of capability instances.
//!
//! A [`DependencyScope`] caches one instance per capability type. Reducer
//! effect code never constructs its own services; it resolves them from a
//! scope, so tests can plant controlled instances and production code gets
//! the real thing.
//!
//! # Lifecycle
//!
//! - A scope is created at application/session start, or per logical
//!   sub-tree (e.g. per child component instance).
//! - [`DependencyScope::child`] snapshots the parent's already-resolved
//!   instances. Later parent resolutions do not propagate down, and child
//!   resolutions never propagate up.
//! - There is no teardown hook; a scope dies when its owner drops it.
//!
//! # Concurrency
//!
//! Resolution takes `&mut self` and is expected to happen before concurrent
//! access begins. After construction the resolved `Arc` handles are shared
//! freely.
//!
//! # Example
//!
//! ```ignore
//! struct Clock { now: fn() -> u64 }
//!
//! impl Capability for Clock {
//!     fn make_default(_scope: &mut DependencyScope) -> Self {
//!         Clock { now: system_now }
//!     }
//! }
//!
//! let mut scope = DependencyScope::new();
//! let clock = scope.resolve::<Clock>();
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A service that a [`DependencyScope`] knows how to construct on demand.
///
/// The factory receives the scope itself so a capability can resolve its own
/// sub-dependencies. Factories must be total: no error path exists for
/// construction failure, and they should do nothing beyond allocation.
pub trait Capability: Send + Sync + 'static {
    /// Construct the default instance of this capability.
    fn make_default(scope: &mut DependencyScope) -> Self;
}

/// A tree node caching constructed capability instances by type identity.
///
/// `resolve` returns the cached instance when present, otherwise constructs
/// via [`Capability::make_default`], caches, and returns it. Two successive
/// resolutions on the same scope return the identical `Arc`.
#[derive(Default)]
pub struct DependencyScope {
    cache: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DependencyScope {
    /// Create an empty root scope.
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Resolve a capability, constructing and caching it on first use.
    ///
    /// The factory is handed this scope, so capabilities may resolve their
    /// own sub-dependencies; those land in the same cache.
    pub fn resolve<C: Capability>(&mut self) -> Arc<C> {
        if let Some(existing) = self.cache.get(&TypeId::of::<C>()) {
            if let Ok(instance) = Arc::clone(existing).downcast::<C>() {
                return instance;
            }
            // Entries are keyed by their concrete TypeId, so the downcast
            // cannot fail; fall through and rebuild rather than panic.
        }
        let instance = Arc::new(C::make_default(self));
        self.cache.insert(TypeId::of::<C>(), Arc::clone(&instance) as _);
        instance
    }

    /// Plant a specific instance, replacing any cached one.
    ///
    /// This is the test seam: overriding a capability before any reducer
    /// runs pins what every later `resolve` sees in this scope (and in
    /// children created afterwards).
    pub fn override_with<C: Capability>(&mut self, instance: C) -> Arc<C> {
        let instance = Arc::new(instance);
        self.cache
            .insert(TypeId::of::<C>(), Arc::clone(&instance) as _);
        instance
    }

    /// Create a child scope seeded with a snapshot of this scope's cache.
    ///
    /// The snapshot is a copy, not a live reference: resolutions after this
    /// call are invisible across the parent/child boundary in either
    /// direction. The cached `Arc` handles themselves still point at the
    /// same instances.
    pub fn child(&self) -> DependencyScope {
        DependencyScope {
            cache: self.cache.clone(),
        }
    }

    /// Create a child scope and eagerly run an initialization pass on it.
    ///
    /// Used to force construction of a subset of capabilities (identity,
    /// configuration) before any reducer runs against the child.
    pub fn with_initialized(&self, init: impl FnOnce(&mut DependencyScope)) -> DependencyScope {
        let mut scope = self.child();
        init(&mut scope);
        scope
    }

    /// Whether a capability instance is already cached in this scope.
    pub fn is_resolved<C: Capability>(&self) -> bool {
        self.cache.contains_key(&TypeId::of::<C>())
    }

    /// Number of cached instances (for debugging).
    pub fn resolved_count(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for DependencyScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyScope")
            .field("resolved", &self.cache.len())
            .finish()
    }
}
