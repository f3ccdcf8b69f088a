//! Versioned cache namespace naming (`name:version`).

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A versioned partition of the blob cache.
///
/// Rendered as `{name}:{version}`, e.g. `network-or-cache:1`. Bumping the
/// version makes every older partition eligible for deletion at activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheNamespace {
    pub name: String,
    pub version: u32,
}

impl CacheNamespace {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self { name: name.into(), version }
    }

    /// Version suffix of a stored namespace string.
    ///
    /// Returns `None` when there is no `:` or the suffix is not a number; such
    /// namespaces never match a running version.
    pub fn version_of(namespace: &str) -> Option<u32> {
        namespace.split_once(':').and_then(|(_, version)| version.parse().ok())
    }

    /// Whether a stored namespace belongs to a different version than `running`.
    pub fn is_outdated(namespace: &str, running: u32) -> bool {
        Self::version_of(namespace) != Some(running)
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for CacheNamespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("namespace without version: {s}")))?;
        let version = version
            .parse()
            .map_err(|_| Error::InvalidInput(format!("namespace version is not a number: {s}")))?;
        Ok(Self::new(name, version))
    }
}
