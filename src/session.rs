//! The locks of a build session.

use std::sync::Arc;

use crate::{
    config::{global_config, Config},
    coordination::ResourceLockCoordinationService,
    identity_path::IdentityPath,
    registry::{ProjectLockRegistry, TaskExecutionLockRegistry},
    resource_lock::ResourceLock,
};

/// The coordination service and lock registries of one build session.
///
/// Whether projects may execute in parallel is read from the [`Config`] when the session is created and is fixed for its lifetime.
/// Locks are dropped with the session.
///
/// ### Example
/// ```rust
/// # use build_locks::{identity_path::IdentityPath, resource_lock::ResourceLockTraits, session::BuildSessionLocks};
/// let session = BuildSessionLocks::new(true);
/// let build = IdentityPath::new(":")?;
/// let lock = session.task_execution_lock(&build, &IdentityPath::new(":app")?);
/// lock.lock();
/// // execute the task
/// lock.unlock()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct BuildSessionLocks {
    coordination_service: ResourceLockCoordinationService,
    project_locks: Arc<ProjectLockRegistry>,
    task_execution_locks: TaskExecutionLockRegistry,
}

impl Default for BuildSessionLocks {
    /// Create the locks of a build session from the [global configuration](global_config).
    fn default() -> Self {
        let config = global_config().clone();
        Self::new_with_config(&config)
    }
}

impl BuildSessionLocks {
    /// Create the locks of a build session.
    #[must_use]
    pub fn new(parallel_project_execution: bool) -> Self {
        let coordination_service = ResourceLockCoordinationService::new();
        let project_locks = Arc::new(ProjectLockRegistry::new(
            coordination_service.clone(),
            parallel_project_execution,
        ));
        let task_execution_locks =
            TaskExecutionLockRegistry::new(coordination_service.clone(), project_locks.clone());
        tracing::debug!(parallel_project_execution, "created build session locks");
        Self {
            coordination_service,
            project_locks,
            task_execution_locks,
        }
    }

    /// Create the locks of a build session from `config`.
    #[must_use]
    pub fn new_with_config(config: &Config) -> Self {
        Self::new(config.parallel_project_execution())
    }

    /// The coordination service of the session.
    #[must_use]
    pub fn coordination_service(&self) -> &ResourceLockCoordinationService {
        &self.coordination_service
    }

    /// The project lock registry of the session.
    #[must_use]
    pub fn project_locks(&self) -> &ProjectLockRegistry {
        &self.project_locks
    }

    /// The task execution lock registry of the session.
    #[must_use]
    pub fn task_execution_locks(&self) -> &TaskExecutionLockRegistry {
        &self.task_execution_locks
    }

    /// Returns true if projects of the same build may execute in parallel.
    #[must_use]
    pub fn allows_parallel_execution(&self) -> bool {
        self.project_locks.allows_parallel_execution()
    }

    /// See [`ProjectLockRegistry::resource_lock`].
    #[must_use]
    pub fn resource_lock(
        &self,
        build_path: &IdentityPath,
        project_path: &IdentityPath,
    ) -> ResourceLock {
        self.project_locks.resource_lock(build_path, project_path)
    }

    /// See [`TaskExecutionLockRegistry::task_execution_lock`].
    #[must_use]
    pub fn task_execution_lock(
        &self,
        build_path: &IdentityPath,
        project_path: &IdentityPath,
    ) -> ResourceLock {
        self.task_execution_locks
            .task_execution_lock(build_path, project_path)
    }
}
