//! Four-level configuration hierarchy.
//!
//! Branch protection and tide context policies share the same shape:
//! a global record, per-organization records, per-repository records and
//! per-branch records. [`PolicyTree`] stores that shape once for any record
//! type and resolves a branch by folding the matching layers with
//! [`Merge`], lowest precedence first:
//!
//! ```text
//! Global → Org → Repo → Branch
//! ```
//!
//! Layers that are not declared are simply skipped, so lookups never need
//! to materialize empty intermediate levels.

use crate::merger::Merge;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(test)]
#[path = "hierarchy_tests.rs"]
mod tests;

/// Level of the hierarchy a layer was declared at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Global,
    Org,
    Repo,
    Branch,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Global => "global",
            Level::Org => "org",
            Level::Repo => "repo",
            Level::Branch => "branch",
        };
        f.write_str(name)
    }
}

/// Declarations for one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "P: Serialize",
    deserialize = "P: Deserialize<'de> + Default"
))]
pub struct OrgNode<P> {
    #[serde(flatten)]
    pub policy: P,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub repos: BTreeMap<String, RepoNode<P>>,
}

impl<P: Default> Default for OrgNode<P> {
    fn default() -> Self {
        Self {
            policy: P::default(),
            repos: BTreeMap::new(),
        }
    }
}

/// Declarations for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "P: Serialize",
    deserialize = "P: Deserialize<'de> + Default"
))]
pub struct RepoNode<P> {
    #[serde(flatten)]
    pub policy: P,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub branches: BTreeMap<String, P>,
}

impl<P: Default> Default for RepoNode<P> {
    fn default() -> Self {
        Self {
            policy: P::default(),
            branches: BTreeMap::new(),
        }
    }
}

/// A global record plus organization, repository and branch overrides.
///
/// # TOML Format
///
/// ```toml
/// protect = true
///
/// [orgs.kubernetes]
/// required_status_checks = { contexts = ["cla"] }
///
/// [orgs.kubernetes.repos.test-infra.branches.main]
/// protect = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "P: Serialize",
    deserialize = "P: Deserialize<'de> + Default"
))]
pub struct PolicyTree<P> {
    #[serde(flatten)]
    pub global: P,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub orgs: BTreeMap<String, OrgNode<P>>,
}

impl<P: Default> Default for PolicyTree<P> {
    fn default() -> Self {
        Self {
            global: P::default(),
            orgs: BTreeMap::new(),
        }
    }
}

impl<P> PolicyTree<P> {
    /// Whether the organization has any declaration.
    pub fn has_org(&self, org: &str) -> bool {
        self.orgs.contains_key(org)
    }

    /// The branch record declared for `org/repo=branch`, if any.
    pub fn declared_branch(&self, org: &str, repo: &str, branch: &str) -> Option<&P> {
        self.orgs
            .get(org)
            .and_then(|o| o.repos.get(repo))
            .and_then(|r| r.branches.get(branch))
    }

    /// Declared layers for a branch, ordered lowest precedence first.
    ///
    /// The global layer is always present; deeper layers appear only when
    /// declared.
    pub fn layers(&self, org: &str, repo: &str, branch: &str) -> Vec<(Level, &P)> {
        let mut layers = vec![(Level::Global, &self.global)];
        if let Some(org_node) = self.orgs.get(org) {
            layers.push((Level::Org, &org_node.policy));
            if let Some(repo_node) = org_node.repos.get(repo) {
                layers.push((Level::Repo, &repo_node.policy));
                if let Some(branch_policy) = repo_node.branches.get(branch) {
                    layers.push((Level::Branch, branch_policy));
                }
            }
        }
        layers
    }

    /// Every declared branch record as `(org, repo, branch, record)`.
    pub fn declared_branches(&self) -> impl Iterator<Item = (&str, &str, &str, &P)> {
        self.orgs.iter().flat_map(|(org, org_node)| {
            org_node.repos.iter().flat_map(move |(repo, repo_node)| {
                repo_node.branches.iter().map(move |(branch, policy)| {
                    (org.as_str(), repo.as_str(), branch.as_str(), policy)
                })
            })
        })
    }
}

impl<P: Merge + Clone> PolicyTree<P> {
    /// Folds the declared layers for a branch into one record.
    pub fn resolve(&self, org: &str, repo: &str, branch: &str) -> P {
        self.layers(org, repo, branch)
            .into_iter()
            .skip(1) // global seeds the fold
            .fold(self.global.clone(), |merged, (_, layer)| merged.merge(layer))
    }
}
