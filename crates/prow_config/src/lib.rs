//! Configuration model and policy resolution for a CI job-scheduling platform.
//!
//! This crate answers, for any `(org, repo, branch)`:
//!
//! - which branch protection applies ([`BranchProtectionConfig`]),
//! - which status checks gate merging ([`ResolvedContextPolicy`]),
//! - which jobs are configured, statically ([`ProwConfig`]) or inside the
//!   repository ([`ProwYaml`]).
//!
//! Branch protection and merge-queue context policies are declared sparsely
//! at four levels (global, org, repo, branch) in a [`PolicyTree`] and folded
//! with the [`Merge`] algebra. Every sparse field is a [`Setting`], which keeps
//! "not declared" apart from "declared false" and "declared empty".

pub mod branch_protection;
pub mod brancher;
pub mod config;
pub mod contexts;
pub mod errors;
pub mod hierarchy;
pub mod jobs;
pub mod merger;
pub mod policy;
pub mod prow_yaml;
pub mod setting;
pub mod tide;

pub use branch_protection::BranchProtectionConfig;
pub use brancher::Brancher;
pub use config::{split_identifier, InRepoConfigSettings, ProwConfig, DEFAULT_CLUSTER};
pub use contexts::{branch_requirements, ContextRequirements};
pub use errors::{ConfigurationError, ConfigurationResult};
pub use hierarchy::{Level, OrgNode, PolicyTree, RepoNode};
pub use jobs::{
    EnvVar, JobBase, Periodic, Postsubmit, PostsubmitConfig, Preset, Presubmit, PresubmitConfig,
};
pub use merger::{Merge, MergeValue};
pub use policy::{BranchPattern, ContextPolicy, Policy, Restrictions, ReviewPolicy};
pub use prow_yaml::{read_prow_yaml, ProwYaml};
pub use setting::Setting;
pub use tide::{MergeMethod, ResolvedContextPolicy, TideConfig, TideContextPolicy, TideQuery};
