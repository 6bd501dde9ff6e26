//! Branch protection resolution.
//!
//! Resolving the protection of `org/repo=branch` happens in three phases:
//!
//! 1. **Merge** the declared policies down the hierarchy
//!    (global → org → repo → branch).
//! 2. **Fold in job contexts**: contexts of presubmits that must pass on the
//!    branch are added to the required status checks. With `protect_tested`
//!    set, a tested branch is protected even when nothing else asks for it.
//! 3. **Validate**: an explicitly unprotected branch must not carry any other
//!    protection setting.
//!
//! Branches of organizations without any declaration, branches matching an
//! `exclude` pattern and branches with nothing declared anywhere in their
//! ancestry resolve to `None` ("no policy"), which is different from a policy
//! with `protect = false` ("explicitly unprotected").

use crate::contexts::branch_requirements;
use crate::errors::{ConfigurationError, ConfigurationResult};
use crate::hierarchy::PolicyTree;
use crate::jobs::Presubmit;
use crate::merger::Merge;
use crate::policy::{ContextPolicy, Policy};
use crate::setting::Setting;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(test)]
#[path = "branch_protection_tests.rs"]
mod tests;

/// Branch protection section of the configuration.
///
/// # TOML Format
///
/// ```toml
/// [branch_protection]
/// protect_tested = true
/// protect = false
///
/// [branch_protection.orgs.kubernetes]
/// protect = true
///
/// [branch_protection.orgs.kubernetes.repos.test-infra.branches.main]
/// protect = true
/// required_status_checks = { contexts = ["cla/linuxfoundation"], strict = true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BranchProtectionConfig {
    /// Protect every branch that has required presubmit contexts.
    #[serde(default)]
    pub protect_tested: bool,

    /// Accept `protect = false` together with other settings, dropping the
    /// other settings.
    #[serde(default)]
    pub allow_disabled_policies: bool,

    /// Accept `protect = false` on branches with required presubmit contexts.
    #[serde(default)]
    pub allow_disabled_job_policies: bool,

    #[serde(flatten)]
    pub policies: PolicyTree<Policy>,
}

impl BranchProtectionConfig {
    /// Resolves the protection policy of a branch.
    ///
    /// `presubmits` are the jobs of the repository; their contexts become
    /// required status checks where they must always pass.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` when the branch is declared with an empty
    ///   policy, or its resolved policy does not set `protect`;
    /// - `PolicyConflict` when an explicitly unprotected branch has required
    ///   jobs or other protection settings and no escape hatch allows it.
    pub fn get_branch_protection(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        presubmits: &[Presubmit],
    ) -> ConfigurationResult<Option<Policy>> {
        if !self.policies.has_org(org) {
            debug!(org = org, "Organization has no branch protection configuration");
            return Ok(None);
        }

        let declared = self.policies.declared_branch(org, repo, branch);
        if let Some(branch_policy) = declared {
            if !branch_policy.is_defined() {
                return Err(ConfigurationError::InvalidConfiguration {
                    field: format!("branch_protection.orgs.{}.repos.{}.branches.{}", org, repo, branch),
                    reason: "declared branch policies must set protect".to_string(),
                });
            }
        }

        let mut policy = self.policies.resolve(org, repo, branch);
        if declared.is_some() && policy.protect.is_inherit() {
            return Err(ConfigurationError::InvalidConfiguration {
                field: format!("branch_protection.orgs.{}.repos.{}.branches.{}", org, repo, branch),
                reason: "declared branch policies must set protect".to_string(),
            });
        }

        if is_excluded(&policy, branch) {
            debug!(org = org, repo = repo, branch = branch, "Branch excluded from protection");
            return Ok(None);
        }

        let required = branch_requirements(branch, presubmits).required;
        if !required.is_empty() {
            if policy.protect.is_false() {
                if !self.allow_disabled_job_policies {
                    return Err(conflict(
                        org,
                        repo,
                        branch,
                        "required prow jobs require branch protection",
                    ));
                }
                warn!(
                    org = org,
                    repo = repo,
                    branch = branch,
                    "Branch has required jobs but protect is false"
                );
            } else {
                let jobs_policy = Policy {
                    protect: if self.protect_tested {
                        Setting::Value(true)
                    } else {
                        Setting::Inherit
                    },
                    required_status_checks: Setting::Value(ContextPolicy {
                        contexts: Setting::Value(required.into_iter().collect()),
                        strict: Setting::Inherit,
                    }),
                    ..Default::default()
                };
                policy = policy.merge(&jobs_policy);
            }
        }

        if policy.protect.is_false() && policy.has_protection_settings() {
            if !self.allow_disabled_policies {
                return Err(conflict(
                    org,
                    repo,
                    branch,
                    "defines a policy, which requires protect: true",
                ));
            }
            warn!(
                org = org,
                repo = repo,
                branch = branch,
                "Branch defines a policy but has protect: false, ignoring the policy"
            );
            policy = Policy {
                protect: Setting::Value(false),
                exclude: policy.exclude,
                ..Default::default()
            };
        }

        if !policy.is_defined() {
            return Ok(None);
        }
        Ok(Some(policy))
    }
}

fn conflict(org: &str, repo: &str, branch: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::PolicyConflict {
        org: org.to_string(),
        repo: repo.to_string(),
        branch: branch.to_string(),
        reason: reason.to_string(),
    }
}

fn is_excluded(policy: &Policy, branch: &str) -> bool {
    policy
        .exclude
        .value()
        .is_some_and(|patterns| patterns.iter().any(|pattern| pattern.is_match(branch)))
}
