//! # Storage URIs
//!
//! Every file the engine touches is addressed as `<scheme>://<path>`.
//! The scheme selects the `FileStorage` backend in the registry; bare paths
//! are treated as `file://`.

use crate::RdgError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Scheme assumed for URIs written without one.
pub const DEFAULT_SCHEME: &str = "file";

const SCHEME_SEPARATOR: &str = "://";

/// A storage location: a partition directory or a file inside one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri(String);

impl Uri {
    /// Parse a URI, normalizing trailing slashes and a missing scheme.
    pub fn parse(s: impl Into<String>) -> Result<Self, RdgError> {
        let raw: String = s.into();
        let (scheme, path) = raw
            .split_once(SCHEME_SEPARATOR)
            .unwrap_or((DEFAULT_SCHEME, raw.as_str()));
        let path = path.trim_end_matches('/');
        if scheme.is_empty() || path.is_empty() {
            return Err(RdgError::InvalidArgument(format!("malformed uri: {raw:?}")));
        }
        Ok(Self(format!("{scheme}{SCHEME_SEPARATOR}{path}")))
    }

    /// URI of a local file-system path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RdgError> {
        Self::parse(path.as_ref().to_string_lossy().into_owned())
    }

    /// Backend selector, e.g. `file` or `mem`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0
            .split_once(SCHEME_SEPARATOR)
            .map(|(scheme, _)| scheme)
            .unwrap_or(DEFAULT_SCHEME)
    }

    /// Everything after `<scheme>://`.
    #[must_use]
    pub fn path(&self) -> &str {
        self.0
            .split_once(SCHEME_SEPARATOR)
            .map(|(_, path)| path)
            .unwrap_or(&self.0)
    }

    /// Child location `self/name`.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        Self(format!("{}/{}", self.0, name.trim_start_matches('/')))
    }

    /// Last path component.
    #[must_use]
    pub fn base_name(&self) -> &str {
        self.path().rsplit('/').next().unwrap_or_default()
    }

    /// A fresh, collision-free file name under this directory.
    ///
    /// Concurrent writers never pick the same name, so column files are
    /// never overwritten in place.
    #[must_use]
    pub fn rand_file(&self, prefix: &str) -> Self {
        self.join(&format!("{}-{}", prefix, Uuid::new_v4().simple()))
    }

    /// The full URI text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Uri {
    type Error = RdgError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Uri> for String {
    fn from(uri: Uri) -> Self {
        uri.0
    }
}
