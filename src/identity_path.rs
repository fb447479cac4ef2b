//! Identity paths of builds and projects, and the keys derived from them.

use derive_more::Display;
use thiserror::Error;

/// The separator between the segments of an [`IdentityPath`].
pub const SEPARATOR: char = ':';

/// A hierarchical build or project identity path.
///
/// Segments are separated by `:` (e.g. `:`, `:app`, `:app:core`).
/// The first segment may be an arbitrary prefix, such as the `/` in `/:buildA:moduleX`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct IdentityPath(String);

/// An invalid identity path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identity path {0:?}")]
pub struct IdentityPathError(String);

impl IdentityPath {
    /// Create a new identity path from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityPathError`] if `path` is not valid according to [`IdentityPath::validate`()].
    pub fn new(path: impl Into<String>) -> Result<Self, IdentityPathError> {
        let path = path.into();
        if Self::validate(&path) {
            Ok(Self(path))
        } else {
            Err(IdentityPathError(path))
        }
    }

    /// The root path `:`.
    #[must_use]
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    /// Extracts a string slice of the identity path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.len() == 1 && self.0.starts_with(SEPARATOR)
    }

    /// Validates a path:
    /// - it is not empty,
    /// - it contains no empty segment (i.e. a `::` substring), and
    /// - a non-root path does not end with `:`.
    #[must_use]
    pub fn validate(path: &str) -> bool {
        let root = SEPARATOR.to_string();
        path == root
            || (!path.is_empty() && !path.ends_with(SEPARATOR) && !path.contains("::"))
    }

    /// Returns the path of the child `name` of this path.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityPathError`] if `name` is empty or contains `:`.
    pub fn child(&self, name: &str) -> Result<Self, IdentityPathError> {
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(IdentityPathError(name.to_string()));
        }
        if self.is_root() {
            Self::new(format!("{SEPARATOR}{name}"))
        } else {
            Self::new(format!("{}{SEPARATOR}{name}", self.0))
        }
    }

    /// Returns the parent of this path, or [`None`] if it has no parent.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) => Some(Self::root()),
            Some(index) => Some(Self(self.0[..index].to_string())),
            None => None,
        }
    }

    /// Returns the last segment of this path, or [`None`] for the root path.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit(SEPARATOR).next()
        }
    }
}

impl TryFrom<&str> for IdentityPath {
    type Error = IdentityPathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

/// The key of a project lock.
///
/// With parallel project execution every project has its own key.
/// Otherwise, all projects of a build collapse onto the key of the build.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum ProjectLockKey {
    /// A single project of a build.
    #[display("{project} of build {build}")]
    Project {
        /// The identity path of the build.
        build: IdentityPath,
        /// The identity path of the project.
        project: IdentityPath,
    },
    /// Every project of a build.
    #[display("build {_0}")]
    Build(IdentityPath),
}
