//! Branch inclusion and exclusion rules for jobs.

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "brancher_tests.rs"]
mod tests;

/// Decides whether a job applies to a branch.
///
/// Exclusion always wins: a branch listed in `skip_branches` never matches,
/// even when it is also listed in `branches`. Otherwise an empty `branches`
/// list matches every branch and a non-empty list matches only its members.
/// Names are compared exactly.
///
/// # Examples
///
/// ```rust
/// use prow_config::Brancher;
///
/// let brancher = Brancher {
///     branches: vec!["main".to_string(), "release".to_string()],
///     skip_branches: vec!["release".to_string()],
/// };
///
/// assert!(brancher.should_run("main"));
/// assert!(!brancher.should_run("release"));
/// assert!(!brancher.should_run("feature"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Brancher {
    /// Branches the job runs against. Empty means all branches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,

    /// Branches the job never runs against.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_branches: Vec<String>,
}

impl Brancher {
    /// Returns `true` if the rule applies to `branch`.
    pub fn should_run(&self, branch: &str) -> bool {
        if self.skip_branches.iter().any(|b| b == branch) {
            return false;
        }
        self.branches.is_empty() || self.branches.iter().any(|b| b == branch)
    }

    /// Returns `true` if some branch name could match both rules.
    ///
    /// Two unrestricted rules always intersect. When either side lists
    /// branches explicitly, one of the listed branches must be accepted by
    /// both rules.
    pub fn intersects(&self, other: &Brancher) -> bool {
        match (self.branches.is_empty(), other.branches.is_empty()) {
            // Both accept an unbounded set minus finitely many exclusions.
            (true, true) => true,
            (false, _) => self.branches.iter().any(|b| self.should_run(b) && other.should_run(b)),
            (true, false) => other.branches.iter().any(|b| self.should_run(b) && other.should_run(b)),
        }
    }
}
