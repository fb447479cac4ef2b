//! Resource locks.
//!
//! A [`ResourceLock`] grants one thread at a time exclusive access to a build-scoped resource, such as the mutable state of a project.
//! The ownership of every lock is held in the state of its [`ResourceLockCoordinationService`].
//!
//! [`ResourceLockTraits`] has two layers of operations:
//!  - state-scoped primitives (`*_in`) which act on a [`ResourceLockState`] inside a coordination critical section, and
//!  - self-contained operations ([`try_lock`](ResourceLockTraits::try_lock), [`lock`](ResourceLockTraits::lock), [`unlock`](ResourceLockTraits::unlock), ...) which open their own critical section.
//!
//! The lock implementations are:
//!  - [`ExclusiveAccessResourceLock`], a lock with its own identity, and
//!  - [`TaskExecutionLock`], a named decorator which forwards every operation to another lock.
//!
//! A thread which already holds a lock may acquire it again; this succeeds immediately and a single release still unlocks it.

use std::{sync::Arc, thread::ThreadId};

use derive_more::{Display, From};
use thiserror::Error;

use crate::coordination::{
    CancellationToken, Disposition, ResourceLockCoordinationService, ResourceLockState,
};

mod exclusive_access;
mod task_execution;

pub use exclusive_access::ExclusiveAccessResourceLock;
pub use task_execution::TaskExecutionLock;

/// The identity of the ownership state of a lock.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From)]
#[display("#{_0}")]
pub struct LockId(u64);

/// A resource lock error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResourceLockError {
    /// A lock was released which is not locked.
    #[error("cannot release {0}: it is not locked")]
    NotLocked(String),
    /// A lock was released by a thread which does not own it.
    #[error("cannot release {0}: it is held by another thread")]
    NotOwner(String),
    /// A blocked operation was cancelled.
    #[error("cancelled while waiting for resource locks")]
    Cancelled,
    /// A lock was passed to a coordination service which does not govern it.
    #[error("{0} is governed by another coordination service")]
    ForeignLock(String),
    /// A cancellation token was passed to a coordination service which did not create it.
    #[error("cancellation token belongs to another coordination service")]
    ForeignCancellationToken,
}

/// A shared resource lock.
pub type ResourceLock = Arc<dyn ResourceLockTraits>;

/// Traits for a resource lock.
pub trait ResourceLockTraits: Send + Sync + core::fmt::Debug {
    /// The identity of the ownership state of this lock.
    fn id(&self) -> LockId;

    /// A human readable description of the locked resource.
    fn display_name(&self) -> &str;

    /// The coordination service holding the state of this lock.
    fn coordination_service(&self) -> &ResourceLockCoordinationService;

    /// Returns the thread which owns this lock in `state`.
    fn owner_in(&self, state: &ResourceLockState) -> Option<ThreadId> {
        state.owner(self.id())
    }

    /// Returns true if this lock is held by any thread in `state`.
    fn is_locked_in(&self, state: &ResourceLockState) -> bool {
        self.owner_in(state).is_some()
    }

    /// Returns true if this lock is held by the current thread in `state`.
    fn is_locked_by_current_thread_in(&self, state: &ResourceLockState) -> bool {
        self.owner_in(state) == Some(std::thread::current().id())
    }

    /// Attempt to acquire this lock for the current thread in `state`.
    ///
    /// Returns true if the current thread holds the lock afterwards.
    /// Returns false if `state` belongs to another service.
    fn try_lock_in(&self, state: &mut ResourceLockState) -> bool;

    /// Release this lock held by the current thread in `state`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceLockError::NotLocked`] if the lock is not held by any thread,
    /// [`ResourceLockError::NotOwner`] if it is held by another thread
    /// or [`ResourceLockError::ForeignLock`] if `state` belongs to another service.
    fn unlock_in(&self, state: &mut ResourceLockState) -> Result<(), ResourceLockError>;

    /// Attempt to acquire this lock without blocking.
    ///
    /// Returns true if the current thread holds the lock afterwards.
    fn try_lock(&self) -> bool {
        let acquired = self.coordination_service().with_state_lock(|state| {
            if self.try_lock_in(state) {
                Disposition::Finished
            } else {
                Disposition::Failed
            }
        });
        tracing::trace!(lock = self.display_name(), acquired, "try lock");
        acquired
    }

    /// Acquire this lock, blocking the current thread until it is able to do so.
    fn lock(&self) {
        self.coordination_service().with_state_lock(|state| {
            if self.try_lock_in(state) {
                Disposition::Finished
            } else {
                Disposition::Retry
            }
        });
        tracing::trace!(lock = self.display_name(), "locked");
    }

    /// Acquire this lock like [`lock`](ResourceLockTraits::lock), returning early if `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceLockError::Cancelled`] if `token` is cancelled before the lock is acquired
    /// or [`ResourceLockError::ForeignCancellationToken`] if `token` belongs to another service.
    fn lock_interruptibly(&self, token: &CancellationToken) -> Result<(), ResourceLockError> {
        self.coordination_service().with_state_lock_interruptibly(
            |state| {
                if self.try_lock_in(state) {
                    Disposition::Finished
                } else {
                    Disposition::Retry
                }
            },
            token,
        )?;
        tracing::trace!(lock = self.display_name(), "locked");
        Ok(())
    }

    /// Release this lock.
    ///
    /// Waiting threads are woken.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceLockError`] if this lock is not held by the current thread, leaving the lock state unchanged.
    fn unlock(&self) -> Result<(), ResourceLockError> {
        let mut result = Ok(());
        self.coordination_service().with_state_lock(|state| {
            result = self.unlock_in(state);
            if result.is_ok() {
                Disposition::Finished
            } else {
                Disposition::Failed
            }
        });
        match &result {
            Ok(()) => tracing::trace!(lock = self.display_name(), "unlocked"),
            Err(err) => tracing::debug!(lock = self.display_name(), %err, "unlock rejected"),
        }
        result
    }

    /// Returns true if this lock is held by any thread.
    fn is_locked(&self) -> bool {
        self.coordination_service()
            .inspect_state(|state| self.is_locked_in(state))
    }

    /// Returns true if this lock is held by the current thread.
    fn is_locked_by_current_thread(&self) -> bool {
        self.coordination_service()
            .inspect_state(|state| self.is_locked_by_current_thread_in(state))
    }
}

/// Returns true if `a` and `b` are the same lock instance.
#[must_use]
pub fn same_lock_instance(a: &ResourceLock, b: &ResourceLock) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
