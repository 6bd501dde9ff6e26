//! Job definitions stored inside a repository.
//!
//! A repository opts into in-repo configuration by committing either a
//! single `.prow.yaml` file or a `.prow/` directory of YAML files. When the
//! directory exists it takes precedence and the file is ignored. Files in the
//! directory are read in path order and concatenated: presets, presubmits and
//! postsubmits from each file are appended, never deep-merged.
//!
//! ```text
//! repo/
//! ├── .prow/
//! │   ├── build.yaml
//! │   └── docs/
//! │       └── checks.yml
//! └── .prow.yaml          # ignored because .prow/ exists
//! ```

use crate::errors::{ConfigurationError, ConfigurationResult};
use crate::jobs::{apply_presets, validate_job_names, validate_presubmits, Postsubmit, Preset, Presubmit};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

#[cfg(test)]
#[path = "prow_yaml_tests.rs"]
mod tests;

/// Name of the single-file in-repo configuration.
pub const IN_REPO_CONFIG_FILE: &str = ".prow.yaml";

/// Name of the in-repo configuration directory.
pub const IN_REPO_CONFIG_DIR: &str = ".prow";

/// Job definitions read from one repository revision.
///
/// Once stored in a cache the bundle is shared between readers and must not
/// be modified; clone it before applying further defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProwYaml {
    #[serde(default)]
    pub presets: Vec<Preset>,

    #[serde(default)]
    pub presubmits: Vec<Presubmit>,

    #[serde(default)]
    pub postsubmits: Vec<Postsubmit>,
}

impl ProwYaml {
    /// Whether the bundle declares nothing at all.
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty() && self.presubmits.is_empty() && self.postsubmits.is_empty()
    }

    /// Parses one YAML document. `source` names the file in error messages.
    pub fn from_yaml_str(content: &str, source: &str) -> ConfigurationResult<Self> {
        serde_yaml::from_str(content).map_err(|e| ConfigurationError::ParseError {
            reason: format!("{}: {}", source, e),
        })
    }

    /// Appends another bundle to this one.
    pub fn extend(&mut self, other: ProwYaml) {
        self.presets.extend(other.presets);
        self.presubmits.extend(other.presubmits);
        self.postsubmits.extend(other.postsubmits);
    }

    /// Applies the bundle's own presets and validates the jobs.
    ///
    /// This step depends only on repository content, so its result can be
    /// cached per revision.
    pub fn apply_local_defaults(&mut self) -> ConfigurationResult<()> {
        let presets = self.presets.clone();
        apply_presets(&presets, &mut self.presubmits)?;
        apply_presets(&presets, &mut self.postsubmits)?;
        self.validate()
    }

    /// Checks job names and presubmit contexts.
    pub fn validate(&self) -> ConfigurationResult<()> {
        validate_presubmits(&self.presubmits)?;
        validate_job_names(&self.postsubmits)
    }
}

/// Reads the in-repo configuration from a checked-out working tree.
///
/// Returns an empty bundle when the repository has neither `.prow/` nor
/// `.prow.yaml`. The result has its own presets applied and is validated.
pub fn read_prow_yaml(root: &Path) -> ConfigurationResult<ProwYaml> {
    let dir = root.join(IN_REPO_CONFIG_DIR);
    let file = root.join(IN_REPO_CONFIG_FILE);

    let mut prow_yaml = if dir.is_dir() {
        read_directory(&dir)?
    } else if file.is_file() {
        read_file(&file)?
    } else {
        debug!(root = %root.display(), "No in-repo configuration found");
        return Ok(ProwYaml::default());
    };

    prow_yaml.apply_local_defaults()?;
    Ok(prow_yaml)
}

fn read_file(path: &Path) -> ConfigurationResult<ProwYaml> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigurationError::FileAccessError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    ProwYaml::from_yaml_str(&content, &path.display().to_string())
}

fn read_directory(dir: &Path) -> ConfigurationResult<ProwYaml> {
    let mut prow_yaml = ProwYaml::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ConfigurationError::FileAccessError {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }

        debug!(file = %path.display(), "Reading in-repo configuration file");
        prow_yaml.extend(read_file(path)?);
    }

    Ok(prow_yaml)
}
