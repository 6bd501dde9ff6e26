//! Merge-queue (tide) configuration: context policies and queries.
//!
//! A [`TideContextPolicy`] is declared sparsely at every level of the
//! hierarchy, just like branch protection. Resolution folds the levels,
//! adds the contexts derived from the repository's presubmits and, when
//! asked to, the required contexts of the resolved branch protection. The
//! result is a [`ResolvedContextPolicy`] whose three context sets must be
//! pairwise disjoint.

use crate::branch_protection::BranchProtectionConfig;
use crate::contexts::branch_requirements;
use crate::errors::{ConfigurationError, ConfigurationResult};
use crate::hierarchy::PolicyTree;
use crate::jobs::Presubmit;
use crate::merger::Merge;
use crate::setting::Setting;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[cfg(test)]
#[path = "tide_tests.rs"]
mod tests;

/// Sparse merge-queue context policy for one level of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TideContextPolicy {
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub required_contexts: Setting<Vec<String>>,

    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub required_if_present_contexts: Setting<Vec<String>>,

    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub optional_contexts: Setting<Vec<String>>,

    /// Treat contexts nobody declared as optional.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub skip_unknown_contexts: Setting<bool>,

    /// Also require the contexts required by branch protection.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub from_branch_protection: Setting<bool>,
}

impl Merge for TideContextPolicy {
    fn merge(&self, child: &Self) -> Self {
        TideContextPolicy {
            required_contexts: self.required_contexts.merge(&child.required_contexts),
            required_if_present_contexts: self
                .required_if_present_contexts
                .merge(&child.required_if_present_contexts),
            optional_contexts: self.optional_contexts.merge(&child.optional_contexts),
            skip_unknown_contexts: self.skip_unknown_contexts.merge(&child.skip_unknown_contexts),
            from_branch_protection: self
                .from_branch_protection
                .merge(&child.from_branch_protection),
        }
    }
}

/// The context policy that applies to one branch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedContextPolicy {
    pub required: BTreeSet<String>,
    pub required_if_present: BTreeSet<String>,
    pub optional: BTreeSet<String>,
    pub skip_unknown_contexts: bool,
}

impl ResolvedContextPolicy {
    /// Checks that no context is classified twice.
    pub fn validate(&self) -> ConfigurationResult<()> {
        let pairs = [
            ("required", &self.required, "optional", &self.optional),
            (
                "required",
                &self.required,
                "required-if-present",
                &self.required_if_present,
            ),
            (
                "optional",
                &self.optional,
                "required-if-present",
                &self.required_if_present,
            ),
        ];
        for (a_name, a, b_name, b) in pairs {
            let overlap: Vec<&str> = a.intersection(b).map(String::as_str).collect();
            if !overlap.is_empty() {
                return Err(ConfigurationError::ContextConflict {
                    reason: format!(
                        "contexts {} are both {} and {}",
                        overlap.join(", "),
                        a_name,
                        b_name
                    ),
                });
            }
        }
        Ok(())
    }

    /// Whether a context reported on a pull request can be ignored.
    ///
    /// Optional membership wins. Required and required-if-present contexts
    /// are not optional: the context is known to be present. Anything else
    /// falls back to `skip_unknown_contexts`.
    pub fn is_optional(&self, context: &str) -> bool {
        if self.optional.contains(context) {
            return true;
        }
        if self.required.contains(context) || self.required_if_present.contains(context) {
            return false;
        }
        self.skip_unknown_contexts
    }

    /// Required contexts absent from `present`.
    pub fn missing_required_contexts(&self, present: &[String]) -> Vec<String> {
        let present: BTreeSet<&str> = present.iter().map(String::as_str).collect();
        self.required
            .iter()
            .filter(|context| !present.contains(context.as_str()))
            .cloned()
            .collect()
    }
}

/// Resolves the merge-queue context policy of a branch.
///
/// # Errors
///
/// Propagates branch protection errors when `from_branch_protection` is set
/// and returns `ContextConflict` when a context lands in more than one set.
pub fn resolve_context_policy(
    options: &PolicyTree<TideContextPolicy>,
    branch_protection: &BranchProtectionConfig,
    org: &str,
    repo: &str,
    branch: &str,
    presubmits: &[Presubmit],
) -> ConfigurationResult<ResolvedContextPolicy> {
    let declared = options.resolve(org, repo, branch);
    let list = |setting: &Setting<Vec<String>>| -> BTreeSet<String> {
        setting.value().cloned().unwrap_or_default().into_iter().collect()
    };

    let mut resolved = ResolvedContextPolicy {
        required: list(&declared.required_contexts),
        required_if_present: list(&declared.required_if_present_contexts),
        optional: list(&declared.optional_contexts),
        skip_unknown_contexts: declared.skip_unknown_contexts.is_true(),
    };

    let derived = branch_requirements(branch, presubmits);
    resolved.required.extend(derived.required);
    resolved.required_if_present.extend(derived.required_if_present);
    resolved.optional.extend(derived.optional);

    if declared.from_branch_protection.is_true() {
        let protection = branch_protection.get_branch_protection(org, repo, branch, presubmits)?;
        // Contexts of a policy that does not set protect are never enforced.
        if let Some(policy) = protection.filter(|policy| policy.protect.is_true()) {
            debug!(
                org = org,
                repo = repo,
                branch = branch,
                "Adding branch protection contexts to tide policy"
            );
            resolved.required.extend(policy.required_contexts());
        }
    }

    resolved.validate()?;
    Ok(resolved)
}

/// Merge method used when materializing pull requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    #[default]
    Merge,
    Squash,
}

/// A merge-queue search definition.
///
/// Only the shape and its construction are handled here; executing the
/// search is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TideQuery {
    #[serde(default)]
    pub orgs: Vec<String>,

    /// Repositories as `org/repo`.
    #[serde(default)]
    pub repos: Vec<String>,

    #[serde(default)]
    pub excluded_repos: Vec<String>,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub missing_labels: Vec<String>,

    #[serde(default)]
    pub included_branches: Vec<String>,

    #[serde(default)]
    pub excluded_branches: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
}

impl TideQuery {
    /// Checks the query for contradictions.
    pub fn validate(&self) -> ConfigurationResult<()> {
        let invalid = |reason: String| Err(ConfigurationError::InvalidTideQuery { reason });

        if self.orgs.is_empty() && self.repos.is_empty() {
            return invalid("query must specify at least one org or repo".to_string());
        }
        for org in &self.orgs {
            if org.is_empty() || org.contains('/') {
                return invalid(format!("org {:?} must be a bare organization name", org));
            }
        }
        for repo in &self.repos {
            match repo.split_once('/') {
                Some((org, name)) if !org.is_empty() && !name.is_empty() && !name.contains('/') => {
                    if self.orgs.iter().any(|o| o == org) {
                        return invalid(format!(
                            "repo {} is already included through org {}",
                            repo, org
                        ));
                    }
                }
                _ => return invalid(format!("repo {:?} must be of the form org/repo", repo)),
            }
        }
        for repo in &self.excluded_repos {
            let org = repo.split_once('/').map(|(org, _)| org).unwrap_or_default();
            if !self.orgs.iter().any(|o| o == org) {
                return invalid(format!(
                    "excluded repo {} does not belong to a declared org",
                    repo
                ));
            }
        }

        let labels: BTreeSet<&String> = self.labels.iter().collect();
        let both: Vec<&str> = self
            .missing_labels
            .iter()
            .filter(|label| labels.contains(label))
            .map(String::as_str)
            .collect();
        if !both.is_empty() {
            return invalid(format!(
                "labels {} are both required and missing",
                both.join(", ")
            ));
        }

        if !self.included_branches.is_empty() && !self.excluded_branches.is_empty() {
            return invalid(
                "included_branches and excluded_branches are mutually exclusive".to_string(),
            );
        }
        Ok(())
    }

    /// Builds the search string for open, mergeable pull requests.
    pub fn query(&self) -> String {
        let mut tokens = vec![
            "is:pr".to_string(),
            "state:open".to_string(),
            "archived:false".to_string(),
        ];
        tokens.extend(self.orgs.iter().map(|org| format!("org:\"{}\"", org)));
        tokens.extend(self.repos.iter().map(|repo| format!("repo:\"{}\"", repo)));
        tokens.extend(self.excluded_repos.iter().map(|repo| format!("-repo:\"{}\"", repo)));
        tokens.extend(self.labels.iter().map(|label| format!("label:\"{}\"", label)));
        tokens.extend(self.missing_labels.iter().map(|label| format!("-label:\"{}\"", label)));
        tokens.extend(self.included_branches.iter().map(|b| format!("base:\"{}\"", b)));
        tokens.extend(self.excluded_branches.iter().map(|b| format!("-base:\"{}\"", b)));
        if let Some(milestone) = &self.milestone {
            tokens.push(format!("milestone:\"{}\"", milestone));
        }
        tokens.join(" ")
    }
}

/// Merge-queue section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TideConfig {
    #[serde(default)]
    pub queries: Vec<TideQuery>,

    #[serde(default)]
    pub context_options: PolicyTree<TideContextPolicy>,

    /// Merge method keyed by `org` or `org/repo`.
    #[serde(default)]
    pub merge_method: BTreeMap<String, MergeMethod>,
}

impl TideConfig {
    /// Merge method for a repository; `org/repo` beats `org`.
    pub fn merge_method_for(&self, org: &str, repo: &str) -> MergeMethod {
        self.merge_method
            .get(&format!("{}/{}", org, repo))
            .or_else(|| self.merge_method.get(org))
            .copied()
            .unwrap_or_default()
    }

    pub fn validate(&self) -> ConfigurationResult<()> {
        self.queries.iter().try_for_each(TideQuery::validate)
    }
}
