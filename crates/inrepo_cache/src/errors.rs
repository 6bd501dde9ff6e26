use prow_config::ConfigurationError;
use repo_client::RepoClientError;
use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors raised while resolving in-repo job definitions.
///
/// Every variant is `Clone`: one construction failure is handed to all
/// callers waiting on the same cache key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InRepoConfigError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Client(#[from] RepoClientError),

    #[error("Failed to resolve a revision of {identifier}: {reason}")]
    RevisionLookup { identifier: String, reason: String },

    #[error("Failed to encode cache key: {reason}")]
    KeyEncoding { reason: String },

    #[error("Cache entry {key} holds a value of an unexpected type")]
    UnexpectedValue { key: String },

    #[error("Background task failed: {reason}")]
    TaskFailed { reason: String },
}

pub type InRepoConfigResult<T> = Result<T, InRepoConfigError>;
