//! Resource lock registries.
//!
//! A [`ResourceLockRegistry`] creates at most one lock per key, on first request, and keeps it for the lifetime of the registry.
//! The registries of a build session are:
//!  - [`ProjectLockRegistry`], the locks protecting the mutable state of projects, and
//!  - [`TaskExecutionLockRegistry`], the locks granting permission to execute tasks.
//!
//! Registries keep no ownership bookkeeping of their own.
//! [`ResourceLockRegistryTraits`] queries are answered from the state of the coordination service.

use std::{collections::HashMap, hash::Hash, sync::Arc};

use parking_lot::Mutex;

use crate::{
    coordination::ResourceLockCoordinationService,
    resource_lock::{ResourceLock, ResourceLockTraits},
};

mod project;
mod task_execution;

pub use project::ProjectLockRegistry;
pub use task_execution::TaskExecutionLockRegistry;

/// Traits for a resource lock registry.
pub trait ResourceLockRegistryTraits {
    /// Returns the locks of this registry which are held by the current thread.
    #[must_use]
    fn resource_locks_by_current_thread(&self) -> Vec<ResourceLock>;

    /// Returns true if any lock of this registry is held by any thread.
    #[must_use]
    fn has_open_locks(&self) -> bool;
}

/// A registry of resource locks of type `L` keyed by `K`.
#[derive(Debug)]
pub struct ResourceLockRegistry<K, L> {
    coordination_service: ResourceLockCoordinationService,
    locks: Mutex<HashMap<K, Arc<L>>>,
}

impl<K, L> ResourceLockRegistry<K, L>
where
    K: Clone + Eq + Hash + core::fmt::Debug,
    L: ResourceLockTraits + 'static,
{
    /// Create a new empty registry of locks governed by `coordination_service`.
    #[must_use]
    pub fn new(coordination_service: ResourceLockCoordinationService) -> Self {
        Self {
            coordination_service,
            locks: Mutex::default(),
        }
    }

    /// The coordination service governing the locks of this registry.
    #[must_use]
    pub fn coordination_service(&self) -> &ResourceLockCoordinationService {
        &self.coordination_service
    }

    /// Returns the lock for `key`, creating it with `producer` if it does not exist.
    ///
    /// The registry is locked while `producer` runs, so concurrent callers with the same key all observe the one lock it creates.
    /// `producer` must not request a lock from this registry.
    pub fn get_or_register_resource_lock<F>(&self, key: &K, producer: F) -> Arc<L>
    where
        F: FnOnce(&K, &ResourceLockCoordinationService) -> L,
    {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(key) {
            return lock.clone();
        }
        let lock = Arc::new(producer(key, &self.coordination_service));
        tracing::debug!(?key, lock = lock.display_name(), "registered resource lock");
        locks.insert(key.clone(), lock.clone());
        lock
    }

    /// Returns the number of locks in the registry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if the registry has no locks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<L>> {
        self.locks.lock().values().cloned().collect()
    }
}

impl<K, L> ResourceLockRegistryTraits for ResourceLockRegistry<K, L>
where
    K: Clone + Eq + Hash + core::fmt::Debug,
    L: ResourceLockTraits + 'static,
{
    fn resource_locks_by_current_thread(&self) -> Vec<ResourceLock> {
        let locks = self.snapshot();
        self.coordination_service.inspect_state(|state| {
            locks
                .into_iter()
                .filter(|lock| lock.is_locked_by_current_thread_in(state))
                .map(|lock| lock as ResourceLock)
                .collect()
        })
    }

    fn has_open_locks(&self) -> bool {
        let locks = self.snapshot();
        self.coordination_service
            .inspect_state(|state| locks.iter().any(|lock| lock.is_locked_in(state)))
    }
}
