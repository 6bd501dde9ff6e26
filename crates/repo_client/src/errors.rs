use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors raised while preparing a repository working copy.
///
/// Payloads are plain strings so that one failure can be handed to several
/// waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoClientError {
    #[error("Failed to clone {repository}: {reason}")]
    CloneFailed { repository: String, reason: String },

    #[error("Failed to fetch {repository}: {reason}")]
    FetchFailed { repository: String, reason: String },

    #[error("Revision {revision} not found in {repository}")]
    RevisionNotFound {
        repository: String,
        revision: String,
    },

    #[error("Merging {head} onto {base} in {repository} produced conflicts")]
    MergeConflict {
        repository: String,
        base: String,
        head: String,
    },

    #[error("Git operation '{operation}' failed: {reason}")]
    GitError { operation: String, reason: String },

    #[error("Failed to access {path}: {reason}")]
    FileSystemError { path: String, reason: String },

    #[error("Background git task failed: {reason}")]
    TaskFailed { reason: String },
}

pub type RepoClientResult<T> = Result<T, RepoClientError>;
