//! The resource lock coordination service.
//!
//! Every [`ResourceLock`] of a build session records its owner in the state of one [`ResourceLockCoordinationService`].
//! The state is guarded by a single [`parking_lot::Mutex`], so an operation run with
//! [`with_state_lock`](ResourceLockCoordinationService::with_state_lock) can inspect and change any number of locks as one atomic step.
//!
//! A state operation reports a [`Disposition`]:
//!  - [`Disposition::Finished`] commits every change made by the operation,
//!  - [`Disposition::Failed`] rolls back every change and returns, and
//!  - [`Disposition::Retry`] rolls back every change, waits until the state changes and runs the operation again.
//!
//! Changes made by an operation which panics are also rolled back.
//! Every committed release wakes all waiting threads, since the service does not know which waiter can now make progress.
//!
//! Callers that need several locks at once must acquire them in one operation (e.g. [`lock_all`](ResourceLockCoordinationService::lock_all)).
//! Acquiring them one at a time with a consistent order across call sites is the caller's responsibility.
//! Locks and cancellation tokens of one service are rejected by every other service.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::ThreadId,
};

use parking_lot::{Condvar, Mutex};

use crate::resource_lock::{LockId, ResourceLock, ResourceLockError};

/// Lock ids are unique in the process, so a lock can never alias a lock of another service.
static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(0);

/// The outcome of a state operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Commit the changes made by the operation.
    Finished,
    /// Roll back the changes made by the operation, wait for a state change and run the operation again.
    Retry,
    /// Roll back the changes made by the operation.
    Failed,
}

#[derive(Debug, Default)]
struct CoordinationState {
    owners: HashMap<LockId, ThreadId>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<CoordinationState>,
    state_changed: Condvar,
}

impl Shared {
    fn notify_state_change(&self) {
        // Holding the state mutex orders the wake-up after any concurrent check-then-wait.
        let _state = self.state.lock();
        self.state_changed.notify_all();
    }
}

/// The lock state visible to a state operation.
///
/// Changes are journaled and rolled back when the state is dropped without being committed.
#[derive(Debug)]
pub struct ResourceLockState<'a> {
    service: &'a ResourceLockCoordinationService,
    owners: &'a mut HashMap<LockId, ThreadId>,
    journal: Vec<(LockId, Option<ThreadId>)>,
}

impl<'a> ResourceLockState<'a> {
    fn new(
        service: &'a ResourceLockCoordinationService,
        owners: &'a mut HashMap<LockId, ThreadId>,
    ) -> Self {
        Self {
            service,
            owners,
            journal: Vec::new(),
        }
    }

    /// Returns true if this is the state of `service`.
    #[must_use]
    pub fn governs(&self, service: &ResourceLockCoordinationService) -> bool {
        self.service.same_service(service)
    }

    /// Returns the thread which owns the lock `id`, or [`None`] if it is unlocked.
    #[must_use]
    pub fn owner(&self, id: LockId) -> Option<ThreadId> {
        self.owners.get(&id).copied()
    }

    pub(crate) fn set_owner(&mut self, id: LockId, owner: Option<ThreadId>) {
        let previous = match owner {
            Some(owner) => self.owners.insert(id, owner),
            None => self.owners.remove(&id),
        };
        self.journal.push((id, previous));
    }

    /// Keep the changes and return true if they released any lock.
    fn commit(mut self) -> bool {
        let journal = std::mem::take(&mut self.journal);
        journal
            .iter()
            .any(|(id, previous)| previous.is_some() && !self.owners.contains_key(id))
    }
}

impl Drop for ResourceLockState<'_> {
    fn drop(&mut self) {
        for (id, previous) in self.journal.drain(..).rev() {
            match previous {
                Some(owner) => self.owners.insert(id, owner),
                None => self.owners.remove(&id),
            };
        }
    }
}

/// A token which interrupts threads blocked in an interruptible acquire.
///
/// Create a token with [`ResourceLockCoordinationService::new_cancellation_token`].
/// A token only interrupts operations of the service which created it.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

impl CancellationToken {
    /// Cancel all operations waiting on this token.
    ///
    /// Waiting threads are woken and return [`ResourceLockError::Cancelled`] without acquiring anything.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.shared.notify_state_change();
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The coordination service of a build session.
///
/// Cloning the service is cheap and yields a handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct ResourceLockCoordinationService(Arc<Shared>);

impl ResourceLockCoordinationService {
    /// Create a new coordination service with no locks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the identity of a new lock governed by this service.
    #[must_use]
    pub fn new_lock_id(&self) -> LockId {
        LockId::from(NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a new cancellation token for [`with_state_lock_interruptibly`](Self::with_state_lock_interruptibly).
    #[must_use]
    pub fn new_cancellation_token(&self) -> CancellationToken {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            shared: self.0.clone(),
        }
    }

    /// Returns true if `other` is a handle to the same service.
    #[must_use]
    pub fn same_service(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Wake every thread waiting for a state change.
    pub fn notify_state_change(&self) {
        self.0.notify_state_change();
    }

    /// Run `operation` inside the state critical section until it does not ask to retry.
    ///
    /// Returns true if the operation finished and false if it failed.
    /// Changes made by a failed or retried run of the operation are rolled back.
    pub fn with_state_lock<F>(&self, operation: F) -> bool
    where
        F: FnMut(&mut ResourceLockState) -> Disposition,
    {
        // Only a cancellation token can produce an error.
        self.run(operation, None).unwrap_or_default()
    }

    /// Run `operation` inside the state critical section until it does not ask to retry or `token` is cancelled.
    ///
    /// Returns true if the operation finished and false if it failed.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceLockError::Cancelled`] if `token` is cancelled before the operation finishes or fails.
    /// No changes made by the operation are visible in that case.
    /// Returns [`ResourceLockError::ForeignCancellationToken`] if `token` was created by another service.
    pub fn with_state_lock_interruptibly<F>(
        &self,
        operation: F,
        token: &CancellationToken,
    ) -> Result<bool, ResourceLockError>
    where
        F: FnMut(&mut ResourceLockState) -> Disposition,
    {
        if !Arc::ptr_eq(&token.shared, &self.0) {
            return Err(ResourceLockError::ForeignCancellationToken);
        }
        self.run(operation, Some(token))
    }

    fn run<F>(
        &self,
        mut operation: F,
        token: Option<&CancellationToken>,
    ) -> Result<bool, ResourceLockError>
    where
        F: FnMut(&mut ResourceLockState) -> Disposition,
    {
        let mut state = self.0.state.lock();
        let mut waits: usize = 0;
        loop {
            if token.is_some_and(CancellationToken::is_cancelled) {
                tracing::warn!(waits, "cancelled while waiting for resource lock state");
                return Err(ResourceLockError::Cancelled);
            }
            let mut lock_state = ResourceLockState::new(self, &mut state.owners);
            match operation(&mut lock_state) {
                Disposition::Finished => {
                    if lock_state.commit() {
                        tracing::trace!("resource lock released, waking waiters");
                        self.0.state_changed.notify_all();
                    }
                    return Ok(true);
                }
                Disposition::Failed => return Ok(false),
                Disposition::Retry => {
                    drop(lock_state);
                    if waits == 0 {
                        tracing::debug!("waiting for resource lock state change");
                    }
                    waits += 1;
                    self.0.state_changed.wait(&mut state);
                    tracing::trace!(waits, "woken by resource lock state change");
                }
            }
        }
    }

    /// Run `inspect` with read-only access to the lock state.
    pub fn inspect_state<R>(&self, inspect: impl FnOnce(&ResourceLockState) -> R) -> R {
        let mut state = self.0.state.lock();
        let lock_state = ResourceLockState::new(self, &mut state.owners);
        inspect(&lock_state)
    }

    fn check_governed(&self, locks: &[ResourceLock]) -> Result<(), ResourceLockError> {
        match locks
            .iter()
            .find(|lock| !lock.coordination_service().same_service(self))
        {
            Some(lock) => Err(ResourceLockError::ForeignLock(
                lock.display_name().to_string(),
            )),
            None => Ok(()),
        }
    }

    /// Try to acquire all of `locks` without blocking.
    ///
    /// Returns true if every lock was acquired, otherwise none of them are acquired.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceLockError::ForeignLock`] if any of the locks is governed by another service.
    pub fn try_lock_all(&self, locks: &[ResourceLock]) -> Result<bool, ResourceLockError> {
        self.check_governed(locks)?;
        Ok(self.with_state_lock(try_lock_op(locks)))
    }

    /// Acquire all of `locks`, blocking the current thread until every one of them is available at once.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceLockError::ForeignLock`] if any of the locks is governed by another service.
    pub fn lock_all(&self, locks: &[ResourceLock]) -> Result<(), ResourceLockError> {
        self.check_governed(locks)?;
        self.with_state_lock(lock_op(locks));
        Ok(())
    }

    /// Acquire all of `locks` like [`lock_all`](Self::lock_all), returning early if `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceLockError::Cancelled`] if `token` is cancelled before all of the locks are acquired.
    /// None of the locks are acquired in that case.
    /// Returns [`ResourceLockError::ForeignLock`] or [`ResourceLockError::ForeignCancellationToken`]
    /// if a lock or `token` belongs to another service.
    pub fn lock_all_interruptibly(
        &self,
        locks: &[ResourceLock],
        token: &CancellationToken,
    ) -> Result<(), ResourceLockError> {
        self.check_governed(locks)?;
        self.with_state_lock_interruptibly(lock_op(locks), token)
            .map(|_| ())
    }

    /// Release all of `locks`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceLockError`] if any of the locks is not held by the current thread
    /// or is governed by another service.
    /// None of the locks are released in that case.
    pub fn unlock_all(&self, locks: &[ResourceLock]) -> Result<(), ResourceLockError> {
        self.check_governed(locks)?;
        let mut result = Ok(());
        self.with_state_lock(|state| {
            result = locks.iter().try_for_each(|lock| lock.unlock_in(state));
            if result.is_ok() {
                Disposition::Finished
            } else {
                Disposition::Failed
            }
        });
        result
    }
}

/// A state operation which acquires all of `locks` or fails.
pub fn try_lock_op(
    locks: &[ResourceLock],
) -> impl FnMut(&mut ResourceLockState) -> Disposition + '_ {
    move |state| {
        if locks.iter().all(|lock| lock.try_lock_in(state)) {
            Disposition::Finished
        } else {
            Disposition::Failed
        }
    }
}

/// A state operation which acquires all of `locks`, retrying until all of them are available.
pub fn lock_op(locks: &[ResourceLock]) -> impl FnMut(&mut ResourceLockState) -> Disposition + '_ {
    move |state| {
        if locks.iter().all(|lock| lock.try_lock_in(state)) {
            Disposition::Finished
        } else {
            Disposition::Retry
        }
    }
}
