//! Task execution lock.

use std::thread::ThreadId;

use crate::coordination::{
    CancellationToken, ResourceLockCoordinationService, ResourceLockState,
};

use super::{LockId, ResourceLock, ResourceLockError, ResourceLockTraits};

/// The permission to execute tasks, backed by a project or build lock.
///
/// Every operation is forwarded to the delegate lock, which remains the only holder of ownership state.
/// Only the display name differs, so that a blocked task can be reported against task execution rather than project state.
#[derive(Debug)]
pub struct TaskExecutionLock {
    display_name: String,
    delegate: ResourceLock,
}

impl TaskExecutionLock {
    /// Create a new task execution lock named `display_name` which forwards to `delegate`.
    #[must_use]
    pub fn new(display_name: impl Into<String>, delegate: ResourceLock) -> Self {
        Self {
            display_name: display_name.into(),
            delegate,
        }
    }

    /// The lock this lock forwards to.
    #[must_use]
    pub fn delegate(&self) -> &ResourceLock {
        &self.delegate
    }
}

impl ResourceLockTraits for TaskExecutionLock {
    fn id(&self) -> LockId {
        self.delegate.id()
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn coordination_service(&self) -> &ResourceLockCoordinationService {
        self.delegate.coordination_service()
    }

    fn owner_in(&self, state: &ResourceLockState) -> Option<ThreadId> {
        self.delegate.owner_in(state)
    }

    fn is_locked_in(&self, state: &ResourceLockState) -> bool {
        self.delegate.is_locked_in(state)
    }

    fn is_locked_by_current_thread_in(&self, state: &ResourceLockState) -> bool {
        self.delegate.is_locked_by_current_thread_in(state)
    }

    fn try_lock_in(&self, state: &mut ResourceLockState) -> bool {
        self.delegate.try_lock_in(state)
    }

    fn unlock_in(&self, state: &mut ResourceLockState) -> Result<(), ResourceLockError> {
        self.delegate.unlock_in(state)
    }

    fn try_lock(&self) -> bool {
        self.delegate.try_lock()
    }

    fn lock(&self) {
        self.delegate.lock();
    }

    fn lock_interruptibly(&self, token: &CancellationToken) -> Result<(), ResourceLockError> {
        self.delegate.lock_interruptibly(token)
    }

    fn unlock(&self) -> Result<(), ResourceLockError> {
        self.delegate.unlock()
    }

    fn is_locked(&self) -> bool {
        self.delegate.is_locked()
    }

    fn is_locked_by_current_thread(&self) -> bool {
        self.delegate.is_locked_by_current_thread()
    }
}
