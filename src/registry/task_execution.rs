//! Task execution lock registry.

use std::sync::Arc;

use crate::{
    coordination::ResourceLockCoordinationService,
    identity_path::IdentityPath,
    resource_lock::{ResourceLock, TaskExecutionLock},
};

use super::{ProjectLockRegistry, ResourceLockRegistry, ResourceLockRegistryTraits};

/// The locks granting permission to execute the tasks of a project.
///
/// If the [`ProjectLockRegistry`] allows parallel execution, the permission to execute a task is the lock of its project.
/// Otherwise, each build has a single [`TaskExecutionLock`] over the build lock, so at most one task of the build executes at a time.
#[derive(Debug)]
pub struct TaskExecutionLockRegistry {
    project_lock_registry: Arc<ProjectLockRegistry>,
    locks: ResourceLockRegistry<IdentityPath, TaskExecutionLock>,
}

impl TaskExecutionLockRegistry {
    /// Create a new task execution lock registry over the locks of `project_lock_registry`.
    #[must_use]
    pub fn new(
        coordination_service: ResourceLockCoordinationService,
        project_lock_registry: Arc<ProjectLockRegistry>,
    ) -> Self {
        Self {
            project_lock_registry,
            locks: ResourceLockRegistry::new(coordination_service),
        }
    }

    /// The project lock registry backing the task execution locks.
    #[must_use]
    pub fn project_lock_registry(&self) -> &Arc<ProjectLockRegistry> {
        &self.project_lock_registry
    }

    /// Returns the lock granting permission to execute a task of project `project_path` of build `build_path`.
    #[must_use]
    pub fn task_execution_lock(
        &self,
        build_path: &IdentityPath,
        project_path: &IdentityPath,
    ) -> ResourceLock {
        if self.project_lock_registry.allows_parallel_execution() {
            self.project_lock_registry
                .resource_lock(build_path, project_path)
        } else {
            self.task_execution_lock_for_build(build_path, project_path)
        }
    }

    fn task_execution_lock_for_build(
        &self,
        build_path: &IdentityPath,
        project_path: &IdentityPath,
    ) -> ResourceLock {
        self.locks
            .get_or_register_resource_lock(build_path, |build_path, _| {
                TaskExecutionLock::new(
                    format!("task execution for build {build_path}"),
                    self.project_lock_registry
                        .resource_lock(build_path, project_path),
                )
            })
    }
}

impl ResourceLockRegistryTraits for TaskExecutionLockRegistry {
    fn resource_locks_by_current_thread(&self) -> Vec<ResourceLock> {
        self.locks.resource_locks_by_current_thread()
    }

    fn has_open_locks(&self) -> bool {
        self.locks.has_open_locks()
    }
}
