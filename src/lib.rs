//! Coordinated resource locks for projects, builds and task execution slots in a parallel build.
//!
//! Many worker threads execute the tasks of a build in parallel.
//! `build_locks` guarantees that no two tasks mutate the state of the same project concurrently, while tasks of disjoint projects proceed in parallel.
//!
//! ## Overview
//!  - [`resource_lock`]: the [`ResourceLock`](resource_lock::ResourceLock) capability, an exclusive lock and the task execution decorator.
//!  - [`coordination`]: the [`ResourceLockCoordinationService`](coordination::ResourceLockCoordinationService) which serializes every lock state transition,
//!    supports acquiring several locks atomically and wakes blocked threads after every release.
//!  - [`registry`]: lazily populated registries with exactly one lock per key.
//!    - [`ProjectLockRegistry`](registry::ProjectLockRegistry): per project locks, or one lock per build if parallel project execution is disabled.
//!    - [`TaskExecutionLockRegistry`](registry::TaskExecutionLockRegistry): the permission to execute a task of a project.
//!  - [`session`]: the coordination service and registries of one build session.
//!  - [`config`]: global configuration, copied into a session when it is created.
//!
//! ## Example
//! ```rust
//! # use build_locks::{identity_path::IdentityPath, resource_lock::ResourceLockTraits, session::BuildSessionLocks};
//! let session = BuildSessionLocks::new(false);
//! let build = IdentityPath::new("/:buildA")?;
//! let x = session.task_execution_lock(&build, &IdentityPath::new("/:buildA:moduleX")?);
//! let y = session.task_execution_lock(&build, &IdentityPath::new("/:buildA:moduleY")?);
//! assert_eq!(x.display_name(), "task execution for build /:buildA");
//!
//! assert!(x.try_lock());
//! assert!(!std::thread::scope(|s| s.spawn(|| y.try_lock()).join().unwrap()));
//! x.unlock()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Lock Ordering
//! Locks acquired together with [`lock_all`](coordination::ResourceLockCoordinationService::lock_all) are never partially held.
//! Threads acquiring several locks one at a time must do so in a consistent order to avoid deadlock.
//!
//! ## Logging
//! Lock registration, waits and transitions are reported with [`tracing`] events.
//!
//! ## Licence
//! `build_locks` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above, without any additional terms or conditions.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod coordination;
pub mod identity_path;
pub mod registry;
pub mod resource_lock;
pub mod session;
