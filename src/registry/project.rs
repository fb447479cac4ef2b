//! Project lock registry.

use crate::{
    coordination::ResourceLockCoordinationService,
    identity_path::{IdentityPath, ProjectLockKey},
    resource_lock::{ExclusiveAccessResourceLock, ResourceLock},
};

use super::{ResourceLockRegistry, ResourceLockRegistryTraits};

/// The locks protecting the mutable state of projects.
///
/// If parallel execution is allowed, every project has its own lock.
/// Otherwise, all projects of a build share the lock of the build.
/// Whether parallel execution is allowed is fixed when the registry is created.
#[derive(Debug)]
pub struct ProjectLockRegistry {
    allows_parallel_execution: bool,
    locks: ResourceLockRegistry<ProjectLockKey, ExclusiveAccessResourceLock>,
}

impl ProjectLockRegistry {
    /// Create a new project lock registry.
    #[must_use]
    pub fn new(
        coordination_service: ResourceLockCoordinationService,
        allows_parallel_execution: bool,
    ) -> Self {
        Self {
            allows_parallel_execution,
            locks: ResourceLockRegistry::new(coordination_service),
        }
    }

    /// Returns true if projects of the same build may be locked independently.
    #[must_use]
    pub fn allows_parallel_execution(&self) -> bool {
        self.allows_parallel_execution
    }

    /// The coordination service governing the locks of this registry.
    #[must_use]
    pub fn coordination_service(&self) -> &ResourceLockCoordinationService {
        self.locks.coordination_service()
    }

    /// Returns the lock protecting the state of project `project_path` of build `build_path`.
    ///
    /// Without parallel execution this is the [build lock](Self::build_lock) of `build_path`.
    #[must_use]
    pub fn resource_lock(
        &self,
        build_path: &IdentityPath,
        project_path: &IdentityPath,
    ) -> ResourceLock {
        if self.allows_parallel_execution {
            let key = ProjectLockKey::Project {
                build: build_path.clone(),
                project: project_path.clone(),
            };
            self.locks
                .get_or_register_resource_lock(&key, |_, coordination_service| {
                    ExclusiveAccessResourceLock::new(
                        format!("state of project {project_path} of build {build_path}"),
                        coordination_service,
                    )
                })
        } else {
            self.build_lock(build_path)
        }
    }

    /// Returns the lock protecting the state of every project of build `build_path`.
    #[must_use]
    pub fn build_lock(&self, build_path: &IdentityPath) -> ResourceLock {
        let key = ProjectLockKey::Build(build_path.clone());
        self.locks
            .get_or_register_resource_lock(&key, |_, coordination_service| {
                ExclusiveAccessResourceLock::new(
                    format!("state of build {build_path}"),
                    coordination_service,
                )
            })
    }
}

impl ResourceLockRegistryTraits for ProjectLockRegistry {
    fn resource_locks_by_current_thread(&self) -> Vec<ResourceLock> {
        self.locks.resource_locks_by_current_thread()
    }

    fn has_open_locks(&self) -> bool {
        self.locks.has_open_locks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_lock::{same_lock_instance, ResourceLockTraits};

    fn path(path: &str) -> IdentityPath {
        IdentityPath::new(path).unwrap()
    }

    #[test]
    fn project_locks_parallel() {
        let registry = ProjectLockRegistry::new(ResourceLockCoordinationService::new(), true);
        assert!(registry.allows_parallel_execution());
        let build = path(":");
        let app = registry.resource_lock(&build, &path(":app"));
        let lib = registry.resource_lock(&build, &path(":lib"));
        assert!(!same_lock_instance(&app, &lib));
        assert!(same_lock_instance(
            &app,
            &registry.resource_lock(&build, &path(":app"))
        ));
        assert_eq!(app.display_name(), "state of project :app of build :");

        // The same project path in another build is another project
        let included = registry.resource_lock(&path(":included"), &path(":app"));
        assert!(!same_lock_instance(&app, &included));
        assert_eq!(
            included.display_name(),
            "state of project :app of build :included"
        );

        app.lock();
        assert!(lib.try_lock());
        assert_eq!(registry.resource_locks_by_current_thread().len(), 2);
        assert!(app.unlock().is_ok());
        assert!(lib.unlock().is_ok());
        assert!(!registry.has_open_locks());
    }

    #[test]
    fn project_locks_serial() {
        let registry = ProjectLockRegistry::new(ResourceLockCoordinationService::new(), false);
        assert!(!registry.allows_parallel_execution());
        let build = path("/:buildA");
        let x = registry.resource_lock(&build, &path("/:buildA:moduleX"));
        let y = registry.resource_lock(&build, &path("/:buildA:moduleY"));
        assert!(same_lock_instance(&x, &y));
        assert!(same_lock_instance(&x, &registry.build_lock(&build)));
        assert_eq!(x.display_name(), "state of build /:buildA");

        let other = registry.resource_lock(&path("/:buildB"), &path("/:buildB:moduleX"));
        assert!(!same_lock_instance(&x, &other));
    }
}
