//! Exclusive access resource lock.

use crate::coordination::{ResourceLockCoordinationService, ResourceLockState};

use super::{LockId, ResourceLockError, ResourceLockTraits};

/// A resource lock which may be held by at most one thread.
#[derive(Debug)]
pub struct ExclusiveAccessResourceLock {
    id: LockId,
    display_name: String,
    coordination_service: ResourceLockCoordinationService,
}

impl ExclusiveAccessResourceLock {
    /// Create a new unlocked lock governed by `coordination_service`.
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        coordination_service: &ResourceLockCoordinationService,
    ) -> Self {
        Self {
            id: coordination_service.new_lock_id(),
            display_name: display_name.into(),
            coordination_service: coordination_service.clone(),
        }
    }
}

impl ResourceLockTraits for ExclusiveAccessResourceLock {
    fn id(&self) -> LockId {
        self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn coordination_service(&self) -> &ResourceLockCoordinationService {
        &self.coordination_service
    }

    fn try_lock_in(&self, state: &mut ResourceLockState) -> bool {
        if !state.governs(&self.coordination_service) {
            return false;
        }
        let current = std::thread::current().id();
        match state.owner(self.id) {
            None => {
                state.set_owner(self.id, Some(current));
                true
            }
            Some(owner) => owner == current,
        }
    }

    fn unlock_in(&self, state: &mut ResourceLockState) -> Result<(), ResourceLockError> {
        if !state.governs(&self.coordination_service) {
            return Err(ResourceLockError::ForeignLock(self.display_name.clone()));
        }
        match state.owner(self.id) {
            None => Err(ResourceLockError::NotLocked(self.display_name.clone())),
            Some(owner) if owner != std::thread::current().id() => {
                Err(ResourceLockError::NotOwner(self.display_name.clone()))
            }
            Some(_) => {
                state.set_owner(self.id, None);
                Ok(())
            }
        }
    }
}
