//! Configuration system error types.
//!
//! Domain-specific errors for configuration parsing, policy resolution
//! and job validation.

use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Configuration system errors.
///
/// These errors occur when parsing the configuration snapshot, reading
/// in-repo job definitions or resolving branch-protection and merge-queue
/// policies. All of them are operator errors: they are reported to the
/// caller and never silently corrected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Failed to access configuration file: {path} - {reason}")]
    FileAccessError { path: String, reason: String },

    #[error("Failed to parse configuration: {reason}")]
    ParseError { reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Invalid regular expression in {field}: {reason}")]
    InvalidPattern { field: String, reason: String },

    /// A resolved branch-protection policy contradicts itself.
    #[error("Branch protection conflict for {org}/{repo}={branch}: {reason}")]
    PolicyConflict {
        org: String,
        repo: String,
        branch: String,
        reason: String,
    },

    /// A status-check context was classified into more than one tide set.
    #[error("Conflicting context classification: {reason}")]
    ContextConflict { reason: String },

    #[error("Invalid job definition '{job}': {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("Invalid tide query: {reason}")]
    InvalidTideQuery { reason: String },
}

/// Result type alias for configuration operations.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;
