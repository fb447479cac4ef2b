//! Global configuration options for build session locks.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the `build_locks` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// A [`BuildSessionLocks`](crate::session::BuildSessionLocks) copies the configuration when it is created.
/// Changing the global configuration afterwards has no effect on an existing session.
///
/// # Locking Configuration Options
///
/// ## Parallel Project Execution
///  > default: [`false`]
///
/// If enabled, every project of a build has its own lock and tasks of different projects may execute concurrently.
/// Otherwise, all projects of a build share a single build-level lock and only one task of that build executes at a time.
#[derive(Debug, Clone)]
pub struct Config {
    parallel_project_execution: bool,
}

#[allow(clippy::derivable_impls)]
impl Default for Config {
    fn default() -> Self {
        Config {
            parallel_project_execution: false,
        }
    }
}

impl Config {
    /// Get the [parallel project execution](#parallel-project-execution) configuration.
    #[must_use]
    pub fn parallel_project_execution(&self) -> bool {
        self.parallel_project_execution
    }

    /// Set the [parallel project execution](#parallel-project-execution) configuration.
    pub fn set_parallel_project_execution(&mut self, parallel_project_execution: bool) {
        self.parallel_project_execution = parallel_project_execution;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global `build_locks` configuration.
///
/// A poisoned lock is recovered, since [`Config`] holds no invariants that a panic could break.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Returns a mutable reference to the global `build_locks` configuration.
///
/// A poisoned lock is recovered, since [`Config`] holds no invariants that a panic could break.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parallel_project_execution() {
        let mut config = Config::default();
        assert!(!config.parallel_project_execution());
        config.set_parallel_project_execution(true);
        assert!(config.parallel_project_execution());
    }

    #[test]
    fn config_global_default() {
        assert!(!Config::default().parallel_project_execution());
        assert!(!global_config().parallel_project_execution());
        assert_eq!(
            global_config().parallel_project_execution(),
            Config::default().parallel_project_execution()
        );
    }
}
