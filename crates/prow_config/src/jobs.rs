//! Job definitions.
//!
//! Jobs are declared in a raw, serializable form ([`PresubmitConfig`],
//! [`PostsubmitConfig`]) and converted into compiled jobs ([`Presubmit`],
//! [`Postsubmit`]) with `TryFrom`. Conversion compiles every regular
//! expression and fills in defaults, so a compiled job can always be matched
//! against branches, changes and comments.
//!
//! Deserializing a compiled job goes through the raw form automatically:
//!
//! ```rust
//! use prow_config::Presubmit;
//!
//! let job: Presubmit = serde_yaml::from_str("name: unit\nalways_run: true").unwrap();
//! assert_eq!(job.context, "unit");
//! assert!(job.triggered_by("/test unit"));
//! ```

use crate::brancher::Brancher;
use crate::errors::{ConfigurationError, ConfigurationResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;

/// Maximum nesting of `run_after_success` chains that traversals follow.
pub const MAX_JOB_TREE_DEPTH: usize = 32;

/// An environment variable injected into a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Fields shared by every kind of job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobBase {
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Build cluster the job is scheduled on. Defaulted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

impl JobBase {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Environment shared by all jobs carrying a set of labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Preset {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub env: Vec<EnvVar>,
}

impl Preset {
    /// A preset applies when the job carries every one of its labels.
    pub fn applies_to(&self, job: &JobBase) -> bool {
        !self.labels.is_empty()
            && self
                .labels
                .iter()
                .all(|(k, v)| job.labels.get(k) == Some(v))
    }

    /// Adds the preset environment to a matching job.
    ///
    /// A variable the job already declares is a conflict.
    pub fn apply(&self, job: &mut JobBase) -> ConfigurationResult<()> {
        if !self.applies_to(job) {
            return Ok(());
        }
        for var in &self.env {
            if job.env.iter().any(|existing| existing.name == var.name) {
                return Err(ConfigurationError::InvalidJob {
                    job: job.name.clone(),
                    reason: format!("env var {} is set by the job and by a preset", var.name),
                });
            }
            job.env.push(var.clone());
        }
        Ok(())
    }
}

/// Raw presubmit declaration, as written in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PresubmitConfig {
    #[serde(flatten)]
    pub base: JobBase,

    /// Status-check context. Defaults to the job name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(flatten)]
    pub brancher: Brancher,

    #[serde(default)]
    pub always_run: bool,

    /// Run only when a changed file matches this pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if_changed: Option<String>,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub skip_report: bool,

    /// Comment pattern that triggers the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_command: Option<String>,

    /// Jobs started once this one succeeds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_after_success: Vec<PresubmitConfig>,
}

impl PresubmitConfig {
    /// A declaration with only a name; every other field takes its default.
    pub fn new(name: &str) -> Self {
        Self {
            base: JobBase::named(name),
            ..Default::default()
        }
    }
}

/// A compiled presubmit job.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "PresubmitConfig")]
pub struct Presubmit {
    pub base: JobBase,
    pub context: String,
    pub brancher: Brancher,
    pub always_run: bool,
    pub run_if_changed: Option<Regex>,
    pub optional: bool,
    pub skip_report: bool,
    pub trigger: Regex,
    pub rerun_command: String,
    pub run_after_success: Vec<Presubmit>,
}

/// Default comment trigger: `/test <name>` or `/test all`.
pub fn default_trigger_for(name: &str) -> String {
    format!(r"(?m)^/test( | .* )(all|{}),?($|\s.*)", regex::escape(name))
}

/// Default rerun command advertised for a job.
pub fn default_rerun_command_for(name: &str) -> String {
    format!("/test {}", name)
}

fn compile(job: &str, field: &str, pattern: &str) -> ConfigurationResult<Regex> {
    Regex::new(pattern).map_err(|e| ConfigurationError::InvalidPattern {
        field: format!("{}.{}", job, field),
        reason: e.to_string(),
    })
}

impl TryFrom<PresubmitConfig> for Presubmit {
    type Error = ConfigurationError;

    fn try_from(config: PresubmitConfig) -> Result<Self, Self::Error> {
        let name = config.base.name.clone();
        if config.always_run && config.run_if_changed.is_some() {
            return Err(ConfigurationError::InvalidJob {
                job: name,
                reason: "always_run and run_if_changed are mutually exclusive".to_string(),
            });
        }

        let run_if_changed = config
            .run_if_changed
            .as_deref()
            .map(|pattern| compile(&name, "run_if_changed", pattern))
            .transpose()?;
        let trigger = match config.trigger.as_deref() {
            Some(pattern) => compile(&name, "trigger", pattern)?,
            None => compile(&name, "trigger", &default_trigger_for(&name))?,
        };
        let run_after_success = config
            .run_after_success
            .into_iter()
            .map(Presubmit::try_from)
            .collect::<ConfigurationResult<Vec<_>>>()?;

        Ok(Presubmit {
            context: config.context.unwrap_or_else(|| name.clone()),
            rerun_command: config
                .rerun_command
                .unwrap_or_else(|| default_rerun_command_for(&name)),
            base: config.base,
            brancher: config.brancher,
            always_run: config.always_run,
            run_if_changed,
            optional: config.optional,
            skip_report: config.skip_report,
            trigger,
            run_after_success,
        })
    }
}

impl Presubmit {
    pub fn name(&self) -> &str {
        &self.base.name
    }

    /// Whether the job is configured for `branch`.
    pub fn could_run(&self, branch: &str) -> bool {
        self.brancher.should_run(branch)
    }

    /// Whether the job only runs when matching files change.
    pub fn triggers_conditionally(&self) -> bool {
        !self.always_run && self.run_if_changed.is_some()
    }

    /// Whether the job's context must pass to merge.
    pub fn context_required(&self) -> bool {
        !self.optional && !self.skip_report
    }

    /// Whether a comment requests this job.
    pub fn triggered_by(&self, comment: &str) -> bool {
        self.trigger.is_match(comment)
    }

    /// Whether any of the changed files matches `run_if_changed`.
    pub fn runs_against_changes(&self, changes: &[String]) -> bool {
        match &self.run_if_changed {
            Some(pattern) => changes.iter().any(|file| pattern.is_match(file)),
            None => false,
        }
    }

    /// Whether the job should start for a pull request against `branch`.
    pub fn should_run(&self, branch: &str, changes: &[String], forced: bool) -> bool {
        if !self.could_run(branch) {
            return false;
        }
        if forced || self.always_run {
            return true;
        }
        self.runs_against_changes(changes)
    }
}

/// Raw postsubmit declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PostsubmitConfig {
    #[serde(flatten)]
    pub base: JobBase,

    #[serde(flatten)]
    pub brancher: Brancher,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if_changed: Option<String>,

    #[serde(default)]
    pub skip_report: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_after_success: Vec<PostsubmitConfig>,
}

impl PostsubmitConfig {
    pub fn new(name: &str) -> Self {
        Self {
            base: JobBase::named(name),
            ..Default::default()
        }
    }
}

/// A compiled postsubmit job.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "PostsubmitConfig")]
pub struct Postsubmit {
    pub base: JobBase,
    pub brancher: Brancher,
    pub run_if_changed: Option<Regex>,
    pub skip_report: bool,
    pub run_after_success: Vec<Postsubmit>,
}

impl TryFrom<PostsubmitConfig> for Postsubmit {
    type Error = ConfigurationError;

    fn try_from(config: PostsubmitConfig) -> Result<Self, Self::Error> {
        let name = config.base.name.clone();
        let run_if_changed = config
            .run_if_changed
            .as_deref()
            .map(|pattern| compile(&name, "run_if_changed", pattern))
            .transpose()?;
        let run_after_success = config
            .run_after_success
            .into_iter()
            .map(Postsubmit::try_from)
            .collect::<ConfigurationResult<Vec<_>>>()?;

        Ok(Postsubmit {
            base: config.base,
            brancher: config.brancher,
            run_if_changed,
            skip_report: config.skip_report,
            run_after_success,
        })
    }
}

impl Postsubmit {
    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn could_run(&self, branch: &str) -> bool {
        self.brancher.should_run(branch)
    }

    /// Whether the job should start for a push of `changes` to `branch`.
    pub fn should_run(&self, branch: &str, changes: &[String]) -> bool {
        if !self.could_run(branch) {
            return false;
        }
        match &self.run_if_changed {
            Some(pattern) => changes.iter().any(|file| pattern.is_match(file)),
            None => true,
        }
    }
}

/// A job started on a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Periodic {
    #[serde(flatten)]
    pub base: JobBase,

    /// Go-style duration such as `1h` or `30m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

impl Periodic {
    /// Exactly one of `interval` and `cron` must be set.
    pub fn validate(&self) -> ConfigurationResult<()> {
        if self.base.name.is_empty() {
            return Err(ConfigurationError::InvalidJob {
                job: String::new(),
                reason: "name must not be empty".to_string(),
            });
        }
        match (&self.interval, &self.cron) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(ConfigurationError::InvalidJob {
                job: self.base.name.clone(),
                reason: "exactly one of interval and cron must be set".to_string(),
            }),
        }
    }
}

/// Access to the shared fields of job trees, for generic traversal.
pub trait JobNode: Sized {
    fn base(&self) -> &JobBase;
    fn base_mut(&mut self) -> &mut JobBase;
    fn brancher(&self) -> &Brancher;
    fn children(&self) -> &[Self];
    fn children_mut(&mut self) -> &mut [Self];
}

impl JobNode for Presubmit {
    fn base(&self) -> &JobBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut JobBase {
        &mut self.base
    }
    fn brancher(&self) -> &Brancher {
        &self.brancher
    }
    fn children(&self) -> &[Self] {
        &self.run_after_success
    }
    fn children_mut(&mut self) -> &mut [Self] {
        &mut self.run_after_success
    }
}

impl JobNode for Postsubmit {
    fn base(&self) -> &JobBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut JobBase {
        &mut self.base
    }
    fn brancher(&self) -> &Brancher {
        &self.brancher
    }
    fn children(&self) -> &[Self] {
        &self.run_after_success
    }
    fn children_mut(&mut self) -> &mut [Self] {
        &mut self.run_after_success
    }
}

/// Depth-first walk over a job forest.
///
/// Yields every job once together with a flag telling whether it is nested
/// under a `run_after_success` parent. The walk is iterative, stops descending
/// below [`MAX_JOB_TREE_DEPTH`] and never yields the same node twice.
pub fn walk_jobs<J: JobNode>(jobs: &[J]) -> Vec<(&J, bool)> {
    walk_jobs_where(jobs, |_| true)
}

/// Like [`walk_jobs`], but skips jobs rejected by `keep` together with
/// everything nested under them.
pub fn walk_jobs_where<J, F>(jobs: &[J], keep: F) -> Vec<(&J, bool)>
where
    J: JobNode,
    F: Fn(&J) -> bool,
{
    let mut visited: HashSet<*const J> = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<(&J, usize)> = jobs.iter().rev().map(|job| (job, 0)).collect();

    while let Some((job, depth)) = stack.pop() {
        if !visited.insert(job as *const J) || !keep(job) {
            continue;
        }
        out.push((job, depth > 0));

        let children = job.children();
        if children.is_empty() {
            continue;
        }
        if depth + 1 >= MAX_JOB_TREE_DEPTH {
            warn!(
                job = %job.base().name,
                depth = depth,
                "run_after_success chain exceeds the maximum depth, ignoring deeper jobs"
            );
            continue;
        }
        stack.extend(children.iter().rev().map(|child| (child, depth + 1)));
    }
    out
}

/// Applies presets to every job in a forest, children included.
pub fn apply_presets<J: JobNode>(presets: &[Preset], jobs: &mut [J]) -> ConfigurationResult<()> {
    let mut stack: Vec<(&mut J, usize)> = jobs.iter_mut().map(|job| (job, 0)).collect();
    while let Some((job, depth)) = stack.pop() {
        for preset in presets {
            preset.apply(job.base_mut())?;
        }
        if depth + 1 < MAX_JOB_TREE_DEPTH {
            stack.extend(job.children_mut().iter_mut().map(|child| (child, depth + 1)));
        }
    }
    Ok(())
}

/// Checks that job names are set and unique among jobs whose branchers
/// intersect.
pub fn validate_job_names<J: JobNode>(jobs: &[J]) -> ConfigurationResult<()> {
    let all = walk_jobs(jobs);
    for (i, (job, _)) in all.iter().enumerate() {
        if job.base().name.is_empty() {
            return Err(ConfigurationError::InvalidJob {
                job: String::new(),
                reason: "name must not be empty".to_string(),
            });
        }
        for (other, _) in &all[i + 1..] {
            if job.base().name == other.base().name && job.brancher().intersects(other.brancher())
            {
                return Err(ConfigurationError::InvalidJob {
                    job: job.base().name.clone(),
                    reason: "duplicated job name on intersecting branches".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Validates a presubmit forest: names, plus contexts unique among jobs with
/// intersecting branchers.
pub fn validate_presubmits(jobs: &[Presubmit]) -> ConfigurationResult<()> {
    validate_job_names(jobs)?;
    let all = walk_jobs(jobs);
    for (i, (job, _)) in all.iter().enumerate() {
        for (other, _) in &all[i + 1..] {
            if job.context == other.context && job.brancher.intersects(&other.brancher) {
                return Err(ConfigurationError::InvalidJob {
                    job: other.name().to_string(),
                    reason: format!(
                        "context {} is already used by job {} on intersecting branches",
                        job.context,
                        job.name()
                    ),
                });
            }
        }
    }
    Ok(())
}
