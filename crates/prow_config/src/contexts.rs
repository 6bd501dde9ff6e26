//! Derivation of required status-check contexts from presubmit jobs.

use crate::jobs::{walk_jobs_where, Presubmit};
use std::collections::BTreeSet;

#[cfg(test)]
#[path = "contexts_tests.rs"]
mod tests;

/// Status-check contexts of a branch, classified by how strictly they gate
/// merging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextRequirements {
    /// Posted on every pull request and must pass.
    pub required: BTreeSet<String>,

    /// May be missing, but must pass when posted.
    pub required_if_present: BTreeSet<String>,

    /// Never gate merging.
    pub optional: BTreeSet<String>,
}

impl ContextRequirements {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.required_if_present.is_empty() && self.optional.is_empty()
    }
}

/// Classifies the contexts of every presubmit that could run on `branch`.
///
/// - optional or skip-report jobs are **optional**;
/// - jobs that only run for matching changes, and every job nested under
///   `run_after_success`, are **required if present**;
/// - everything else is **required**.
///
/// Nested jobs only run after their parent succeeds, so their context can be
/// missing from a pull request even when they always run themselves.
///
/// # Examples
///
/// ```rust
/// use prow_config::{branch_requirements, Presubmit, PresubmitConfig};
///
/// let unit = Presubmit::try_from(PresubmitConfig {
///     always_run: true,
///     ..PresubmitConfig::new("unit")
/// })?;
///
/// let requirements = branch_requirements("main", &[unit]);
/// assert!(requirements.required.contains("unit"));
/// # Ok::<(), prow_config::ConfigurationError>(())
/// ```
pub fn branch_requirements(branch: &str, jobs: &[Presubmit]) -> ContextRequirements {
    let mut requirements = ContextRequirements::default();

    // A job that cannot run on the branch never starts its children either.
    for (job, nested) in walk_jobs_where(jobs, |job| job.could_run(branch)) {
        let context = job.context.clone();
        if !job.context_required() {
            requirements.optional.insert(context);
        } else if nested || job.triggers_conditionally() {
            requirements.required_if_present.insert(context);
        } else {
            requirements.required.insert(context);
        }
    }

    requirements
}
