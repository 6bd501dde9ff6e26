//! Top-level configuration snapshot.
//!
//! [`ProwConfig`] gathers every section that resolution needs: branch
//! protection, merge-queue settings, in-repo configuration switches and the
//! statically declared jobs. It is read from TOML, has its static presets
//! applied and is validated as a whole before use.
//!
//! # TOML Format
//!
//! ```toml
//! [branch_protection]
//! protect_tested = true
//!
//! [branch_protection.orgs.kubernetes]
//! protect = true
//!
//! [tide]
//! merge_method = { "kubernetes/website" = "squash" }
//!
//! [[tide.queries]]
//! orgs = ["kubernetes"]
//! labels = ["lgtm", "approved"]
//!
//! [in_repo_config]
//! enabled = { "kubernetes" = true }
//! allowed_clusters = { "*" = ["default"] }
//!
//! [[presubmits."kubernetes/test-infra"]]
//! name = "unit"
//! always_run = true
//! ```

use crate::branch_protection::BranchProtectionConfig;
use crate::errors::{ConfigurationError, ConfigurationResult};
use crate::jobs::{
    apply_presets, validate_job_names, validate_presubmits, JobNode, Periodic, Postsubmit,
    Preset, Presubmit, MAX_JOB_TREE_DEPTH,
};
use crate::policy::Policy;
use crate::prow_yaml::ProwYaml;
use crate::tide::{resolve_context_policy, MergeMethod, ResolvedContextPolicy, TideConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Cluster jobs run on when they do not name one.
pub const DEFAULT_CLUSTER: &str = "default";

/// Key matching every repository in identifier-keyed maps.
pub const WILDCARD: &str = "*";

fn default_cache_size() -> usize {
    100
}

/// Switches and limits for job definitions stored in repositories.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InRepoConfigSettings {
    /// Enablement keyed by `org/repo`, `org` or `*`.
    #[serde(default)]
    pub enabled: BTreeMap<String, bool>,

    /// Clusters in-repo jobs may use, keyed like `enabled`.
    #[serde(default)]
    pub allowed_clusters: BTreeMap<String, Vec<String>>,

    /// Number of revisions kept by the in-repo configuration cache.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for InRepoConfigSettings {
    fn default() -> Self {
        Self {
            enabled: BTreeMap::new(),
            allowed_clusters: BTreeMap::new(),
            cache_size: default_cache_size(),
        }
    }
}

/// A validated configuration snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProwConfig {
    #[serde(default)]
    pub branch_protection: BranchProtectionConfig,

    #[serde(default)]
    pub tide: TideConfig,

    #[serde(default)]
    pub in_repo_config: InRepoConfigSettings,

    #[serde(default)]
    pub presets: Vec<Preset>,

    /// Static presubmits keyed by `org/repo`.
    #[serde(default)]
    pub presubmits: BTreeMap<String, Vec<Presubmit>>,

    /// Static postsubmits keyed by `org/repo`.
    #[serde(default)]
    pub postsubmits: BTreeMap<String, Vec<Postsubmit>>,

    #[serde(default)]
    pub periodics: Vec<Periodic>,
}

impl ProwConfig {
    /// Parses a TOML document, applies static presets and validates.
    pub fn from_toml_str(content: &str) -> ConfigurationResult<Self> {
        let mut config: ProwConfig =
            toml::from_str(content).map_err(|e| ConfigurationError::ParseError {
                reason: e.to_string(),
            })?;

        let presets = config.presets.clone();
        for jobs in config.presubmits.values_mut() {
            apply_presets(&presets, jobs)?;
        }
        for jobs in config.postsubmits.values_mut() {
            apply_presets(&presets, jobs)?;
        }

        config.validate()?;
        info!(
            repositories = config.presubmits.len(),
            periodics = config.periodics.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: &Path) -> ConfigurationResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigurationError::FileAccessError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_toml_str(&content)
    }

    /// Validates every section against the others.
    ///
    /// Every declared branch protection and tide context policy entry is
    /// resolved against the static presubmits of its repository.
    pub fn validate(&self) -> ConfigurationResult<()> {
        self.tide.validate()?;

        for (identifier, jobs) in &self.presubmits {
            split_identifier(identifier)?;
            validate_presubmits(jobs)?;
        }
        for (identifier, jobs) in &self.postsubmits {
            split_identifier(identifier)?;
            validate_job_names(jobs)?;
        }
        for periodic in &self.periodics {
            periodic.validate()?;
        }

        for (org, repo, branch, _) in self.branch_protection.policies.declared_branches() {
            let presubmits = self.presubmits_for(org, repo);
            self.branch_protection
                .get_branch_protection(org, repo, branch, presubmits)?;
        }
        for (org, repo, branch, _) in self.tide.context_options.declared_branches() {
            self.tide_context_policy(org, repo, branch, &[])?;
        }
        Ok(())
    }

    /// Static presubmits of a repository.
    pub fn presubmits_for(&self, org: &str, repo: &str) -> &[Presubmit] {
        self.presubmits
            .get(&format!("{}/{}", org, repo))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Static postsubmits of a repository.
    pub fn postsubmits_for(&self, org: &str, repo: &str) -> &[Postsubmit] {
        self.postsubmits
            .get(&format!("{}/{}", org, repo))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether in-repo configuration is enabled for an identifier.
    ///
    /// The identifier itself is consulted first, then its org prefix and
    /// finally the `*` entry. Missing everywhere means disabled.
    pub fn in_repo_config_enabled(&self, identifier: &str) -> bool {
        lookup(&self.in_repo_config.enabled, identifier)
            .copied()
            .unwrap_or(false)
    }

    /// Clusters in-repo jobs of an identifier may run on.
    pub fn allowed_clusters_for(&self, identifier: &str) -> Vec<String> {
        lookup(&self.in_repo_config.allowed_clusters, identifier)
            .cloned()
            .unwrap_or_else(|| vec![DEFAULT_CLUSTER.to_string()])
    }

    /// Merge method for a repository.
    pub fn merge_method(&self, org: &str, repo: &str) -> MergeMethod {
        self.tide.merge_method_for(org, repo)
    }

    /// Applies the defaults that depend on this configuration to an in-repo
    /// bundle: static presets, cluster defaults and the allowed-cluster check.
    ///
    /// Only ever call this on a private copy of a cached bundle.
    pub fn default_and_validate_prow_yaml(
        &self,
        prow_yaml: &mut ProwYaml,
        identifier: &str,
    ) -> ConfigurationResult<()> {
        apply_presets(&self.presets, &mut prow_yaml.presubmits)?;
        apply_presets(&self.presets, &mut prow_yaml.postsubmits)?;

        let allowed = self.allowed_clusters_for(identifier);
        default_clusters(&mut prow_yaml.presubmits, &allowed, identifier)?;
        default_clusters(&mut prow_yaml.postsubmits, &allowed, identifier)?;

        debug!(
            identifier = identifier,
            presubmits = prow_yaml.presubmits.len(),
            postsubmits = prow_yaml.postsubmits.len(),
            "Defaulted in-repo configuration"
        );
        prow_yaml.validate()
    }

    /// Branch protection of a branch, given the repository's full presubmit
    /// set (static plus in-repo).
    pub fn get_branch_protection(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        presubmits: &[Presubmit],
    ) -> ConfigurationResult<Option<Policy>> {
        self.branch_protection
            .get_branch_protection(org, repo, branch, presubmits)
    }

    /// Merge-queue context policy of a branch.
    ///
    /// `extra_presubmits` are added to the repository's static presubmits.
    pub fn tide_context_policy(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        extra_presubmits: &[Presubmit],
    ) -> ConfigurationResult<ResolvedContextPolicy> {
        let mut presubmits = self.presubmits_for(org, repo).to_vec();
        presubmits.extend_from_slice(extra_presubmits);
        resolve_context_policy(
            &self.tide.context_options,
            &self.branch_protection,
            org,
            repo,
            branch,
            &presubmits,
        )
    }
}

/// Splits `org/repo` (or `host/org/repo`) into org and repository name.
///
/// The org is everything before the last `/`.
pub fn split_identifier(identifier: &str) -> ConfigurationResult<(&str, &str)> {
    match identifier.rsplit_once('/') {
        Some((org, repo)) if !org.is_empty() && !repo.is_empty() => Ok((org, repo)),
        _ => Err(ConfigurationError::InvalidConfiguration {
            field: "identifier".to_string(),
            reason: format!("{:?} is not of the form org/repo", identifier),
        }),
    }
}

fn lookup<'a, V>(map: &'a BTreeMap<String, V>, identifier: &str) -> Option<&'a V> {
    map.get(identifier)
        .or_else(|| {
            split_identifier(identifier)
                .ok()
                .and_then(|(org, _)| map.get(org))
        })
        .or_else(|| map.get(WILDCARD))
}

fn default_clusters<J: JobNode>(
    jobs: &mut [J],
    allowed: &[String],
    identifier: &str,
) -> ConfigurationResult<()> {
    let mut stack: Vec<(&mut J, usize)> = jobs.iter_mut().map(|job| (job, 0)).collect();
    while let Some((job, depth)) = stack.pop() {
        let base = job.base_mut();
        let cluster: &str = base
            .cluster
            .get_or_insert_with(|| DEFAULT_CLUSTER.to_string());
        if !allowed.iter().any(|c| c.as_str() == cluster) {
            return Err(ConfigurationError::InvalidJob {
                job: base.name.clone(),
                reason: format!(
                    "cluster {} is not allowed for {}, allowed: {}",
                    cluster,
                    identifier,
                    allowed.join(", ")
                ),
            });
        }
        if depth + 1 < MAX_JOB_TREE_DEPTH {
            stack.extend(job.children_mut().iter_mut().map(|child| (child, depth + 1)));
        }
    }
    Ok(())
}
