//! Content-addressed cache keys.
//!
//! A key is the JSON encoding of [`CacheKeyParts`]. Field order is fixed by
//! the struct and head revisions keep the order they were given in, so equal
//! inputs always produce byte-identical keys while reordered heads (which
//! merge differently) produce different keys.

use crate::errors::{InRepoConfigError, InRepoConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;

/// Inputs that determine a repository's job definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKeyParts {
    pub identifier: String,
    pub base_sha: String,
    pub head_shas: Vec<String>,
}

/// Encoded [`CacheKeyParts`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_parts(parts: &CacheKeyParts) -> InRepoConfigResult<Self> {
        serde_json::to_string(parts)
            .map(CacheKey)
            .map_err(|e| InRepoConfigError::KeyEncoding {
                reason: e.to_string(),
            })
    }

    /// Decodes the key back into its parts.
    pub fn parts(&self) -> InRepoConfigResult<CacheKeyParts> {
        serde_json::from_str(&self.0).map_err(|e| InRepoConfigError::KeyEncoding {
            reason: e.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
