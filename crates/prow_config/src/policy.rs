//! Branch protection policy records.
//!
//! A [`Policy`] is a sparse override: every field is a [`Setting`] so that a
//! level of the hierarchy can leave a field to its parent, explicitly disable
//! it, or declare a value.

use crate::errors::{ConfigurationError, ConfigurationResult};
use crate::merger::{Merge, MergeValue};
use crate::setting::Setting;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;

/// Branch protection settings for one level of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Policy {
    /// Whether the branch is protected at all.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub protect: Setting<bool>,

    /// Status checks that must pass before merging.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub required_status_checks: Setting<ContextPolicy>,

    /// Enforce the policy for administrators too.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub enforce_admins: Setting<bool>,

    /// Who may push or merge.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub restrictions: Setting<Restrictions>,

    /// Pull request review requirements.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub required_pull_request_reviews: Setting<ReviewPolicy>,

    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub required_linear_history: Setting<bool>,

    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub allow_force_pushes: Setting<bool>,

    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub allow_deletions: Setting<bool>,

    /// Branch name patterns that are left unprotected.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub exclude: Setting<Vec<BranchPattern>>,
}

impl Policy {
    /// Returns `true` when any field is declared.
    pub fn is_defined(&self) -> bool {
        self.protect.is_set() || self.has_protection_settings()
    }

    /// Returns `true` when any field other than `protect` is declared.
    ///
    /// `exclude` only selects branches and is not a protection setting.
    pub fn has_protection_settings(&self) -> bool {
        self.required_status_checks.is_set()
            || self.enforce_admins.is_set()
            || self.restrictions.is_set()
            || self.required_pull_request_reviews.is_set()
            || self.required_linear_history.is_set()
            || self.allow_force_pushes.is_set()
            || self.allow_deletions.is_set()
    }

    /// Contexts required by `required_status_checks`, empty when undeclared.
    pub fn required_contexts(&self) -> Vec<String> {
        self.required_status_checks
            .value()
            .and_then(|checks| checks.contexts.value().cloned())
            .unwrap_or_default()
    }
}

impl Merge for Policy {
    fn merge(&self, child: &Self) -> Self {
        Policy {
            protect: self.protect.merge(&child.protect),
            required_status_checks: self
                .required_status_checks
                .merge(&child.required_status_checks),
            enforce_admins: self.enforce_admins.merge(&child.enforce_admins),
            restrictions: self.restrictions.merge(&child.restrictions),
            required_pull_request_reviews: self
                .required_pull_request_reviews
                .merge(&child.required_pull_request_reviews),
            required_linear_history: self
                .required_linear_history
                .merge(&child.required_linear_history),
            allow_force_pushes: self.allow_force_pushes.merge(&child.allow_force_pushes),
            allow_deletions: self.allow_deletions.merge(&child.allow_deletions),
            exclude: self.exclude.merge(&child.exclude),
        }
    }
}

/// A branch name regular expression, compiled when it is loaded.
///
/// Two patterns are equal when their sources are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchPattern {
    source: String,
    regex: Regex,
}

impl BranchPattern {
    pub fn new(source: &str) -> ConfigurationResult<Self> {
        let regex = Regex::new(source).map_err(|e| ConfigurationError::InvalidPattern {
            field: "branch_protection.exclude".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }
}

impl TryFrom<String> for BranchPattern {
    type Error = ConfigurationError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::new(&source)
    }
}

impl From<BranchPattern> for String {
    fn from(pattern: BranchPattern) -> Self {
        pattern.source
    }
}

impl PartialEq for BranchPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for BranchPattern {}

impl Hash for BranchPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

/// Required status check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextPolicy {
    /// Context names that must report success.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub contexts: Setting<Vec<String>>,

    /// Require the branch to be up to date with the base before merging.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub strict: Setting<bool>,
}

impl Merge for ContextPolicy {
    fn merge(&self, child: &Self) -> Self {
        ContextPolicy {
            contexts: self.contexts.merge(&child.contexts),
            strict: self.strict.merge(&child.strict),
        }
    }
}

impl MergeValue for ContextPolicy {
    fn merge_value(&self, child: &Self) -> Self {
        self.merge(child)
    }

    fn normalized(&self) -> Self {
        self.merge(&Self::default())
    }
}

/// Users and teams allowed to push or dismiss reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Restrictions {
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub users: Setting<Vec<String>>,

    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub teams: Setting<Vec<String>>,
}

impl Merge for Restrictions {
    fn merge(&self, child: &Self) -> Self {
        Restrictions {
            users: self.users.merge(&child.users),
            teams: self.teams.merge(&child.teams),
        }
    }
}

impl MergeValue for Restrictions {
    fn merge_value(&self, child: &Self) -> Self {
        self.merge(child)
    }

    fn normalized(&self) -> Self {
        self.merge(&Self::default())
    }
}

/// Pull request review requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReviewPolicy {
    /// Dismiss approvals when new commits are pushed.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub dismiss_stale_reviews: Setting<bool>,

    /// Require an approval from a code owner.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub require_code_owner_reviews: Setting<bool>,

    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub required_approving_review_count: Setting<u32>,

    /// Who may dismiss reviews.
    #[serde(default, skip_serializing_if = "Setting::is_inherit")]
    pub dismissal_restrictions: Setting<Restrictions>,
}

impl Merge for ReviewPolicy {
    fn merge(&self, child: &Self) -> Self {
        ReviewPolicy {
            dismiss_stale_reviews: self.dismiss_stale_reviews.merge(&child.dismiss_stale_reviews),
            require_code_owner_reviews: self
                .require_code_owner_reviews
                .merge(&child.require_code_owner_reviews),
            required_approving_review_count: self
                .required_approving_review_count
                .merge(&child.required_approving_review_count),
            dismissal_restrictions: self
                .dismissal_restrictions
                .merge(&child.dismissal_restrictions),
        }
    }
}

impl MergeValue for ReviewPolicy {
    fn merge_value(&self, child: &Self) -> Self {
        self.merge(child)
    }

    fn normalized(&self) -> Self {
        self.merge(&Self::default())
    }
}
