//! Revision-keyed cache of in-repo job definitions.
//!
//! [`InRepoConfigCache::get`] resolves the base and head revisions of a
//! change, merges them in a cached working copy and reads the repository's
//! `.prow/` directory or `.prow.yaml`. The result is stored once per
//! `(identifier, base, heads)` and shared read-only between callers.
//!
//! Defaults that depend on the configuration snapshot (static presets,
//! cluster defaults) are never written into a stored bundle; the
//! `get_prow_yaml` family applies them to a private copy.
//!
//! The store holds type-erased values so that it can be shared with other
//! users. A value of an unexpected type under one of our keys is reported as
//! [`InRepoConfigError::UnexpectedValue`].

use crate::errors::{InRepoConfigError, InRepoConfigResult};
use crate::key::{CacheKey, CacheKeyParts};
use crate::lru_store::{EvictionReason, LruStore};
use crate::metrics::CacheMetrics;
use crate::refs::RefGetter;
use prow_config::{
    read_prow_yaml, split_identifier, ConfigurationError, Policy, Postsubmit, Presubmit,
    ProwConfig, ProwYaml, ResolvedContextPolicy,
};
use repo_client::ClientCache;
use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;

/// Value type of the shared store.
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// LRU store shared by the cache and, optionally, other users.
pub type SharedStore = LruStore<CacheKey, dyn Any + Send + Sync, InRepoConfigError>;

/// Creates a store whose evictions are reported to `metrics`.
pub fn new_shared_store(capacity: NonZeroUsize, metrics: Arc<dyn CacheMetrics>) -> SharedStore {
    LruStore::new(capacity).with_eviction_callback(
        move |key: &CacheKey, value: Option<&StoredValue>, reason: EvictionReason| {
            record_eviction(metrics.as_ref(), key, value.is_some(), reason);
        },
    )
}

fn record_eviction(
    metrics: &dyn CacheMetrics,
    key: &CacheKey,
    had_value: bool,
    reason: EvictionReason,
) {
    let parts = match key.parts() {
        Ok(parts) => parts,
        Err(e) => {
            warn!(key = %key, error = %e, "Skipping metrics for undecodable key");
            return;
        }
    };
    let (org, repo) = match split_identifier(&parts.identifier) {
        Ok(split) => split,
        Err(e) => {
            warn!(key = %key, error = %e, "Skipping metrics for undecodable key");
            return;
        }
    };

    debug!(key = %key, reason = ?reason, "Cache entry evicted");
    match reason {
        EvictionReason::Capacity => metrics.record_forced_eviction(org, repo),
        EvictionReason::Invalidated => metrics.record_manual_eviction(org, repo),
    }
    if had_value {
        metrics.adjust_size(org, repo, -1);
    }
}

async fn resolve_ref(identifier: &str, getter: &dyn RefGetter) -> InRepoConfigResult<String> {
    getter
        .resolve()
        .await
        .map_err(|e| InRepoConfigError::RevisionLookup {
            identifier: identifier.to_string(),
            reason: format!("{:#}", e),
        })
}

/// Cache of in-repo job definitions in front of a [`ClientCache`].
pub struct InRepoConfigCache {
    config: Arc<ProwConfig>,
    store: Arc<SharedStore>,
    clients: Arc<ClientCache>,
    metrics: Arc<dyn CacheMetrics>,
}

impl InRepoConfigCache {
    /// Creates a cache sized by `in_repo_config.cache_size`.
    ///
    /// # Errors
    ///
    /// A cache size of zero is an invalid configuration.
    pub fn new(
        config: Arc<ProwConfig>,
        clients: Arc<ClientCache>,
        metrics: Arc<dyn CacheMetrics>,
    ) -> InRepoConfigResult<Self> {
        let capacity = NonZeroUsize::new(config.in_repo_config.cache_size).ok_or_else(|| {
            ConfigurationError::InvalidConfiguration {
                field: "in_repo_config.cache_size".to_string(),
                reason: "must be greater than zero".to_string(),
            }
        })?;
        let store = Arc::new(new_shared_store(capacity, metrics.clone()));
        info!(capacity = capacity.get(), "Created in-repo configuration cache");
        Ok(Self::with_store(config, store, clients, metrics))
    }

    /// Creates a cache on top of an existing store.
    ///
    /// Eviction metrics are only recorded when the store was built with
    /// [`new_shared_store`].
    pub fn with_store(
        config: Arc<ProwConfig>,
        store: Arc<SharedStore>,
        clients: Arc<ClientCache>,
        metrics: Arc<dyn CacheMetrics>,
    ) -> Self {
        Self {
            config,
            store,
            clients,
            metrics,
        }
    }

    pub fn config(&self) -> &ProwConfig {
        &self.config
    }

    /// Job definitions of `identifier` at `base` with `heads` merged in.
    ///
    /// The returned bundle is shared and carries only repository-local
    /// defaults. When in-repo configuration is disabled for the identifier an
    /// empty bundle is returned and the cache is not consulted.
    ///
    /// # Errors
    ///
    /// - `RevisionLookup` when a getter fails;
    /// - `Client` when the repository cannot be merged;
    /// - `Configuration` when the in-repo files are invalid;
    /// - `UnexpectedValue` when the store holds a foreign value for the key.
    #[instrument(skip(self, base, heads), fields(heads = heads.len()))]
    pub async fn get(
        &self,
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> InRepoConfigResult<Arc<ProwYaml>> {
        let (org, repo) = split_identifier(identifier)?;

        let base_sha = resolve_ref(identifier, base).await?;
        let mut head_shas = Vec::with_capacity(heads.len());
        for head in heads {
            head_shas.push(resolve_ref(identifier, *head).await?);
        }

        if !self.config.in_repo_config_enabled(identifier) {
            debug!("In-repo configuration disabled, returning empty bundle");
            return Ok(Arc::new(ProwYaml::default()));
        }

        let started = Instant::now();
        self.metrics.record_lookup(org, repo);
        let result = self.lookup(identifier, org, repo, base_sha, head_shas).await;
        self.metrics.observe_duration(org, repo, started.elapsed());
        result
    }

    async fn lookup(
        &self,
        identifier: &str,
        org: &str,
        repo: &str,
        base_sha: String,
        head_shas: Vec<String>,
    ) -> InRepoConfigResult<Arc<ProwYaml>> {
        let key = CacheKey::from_parts(&CacheKeyParts {
            identifier: identifier.to_string(),
            base_sha,
            head_shas,
        })?;

        let (value, hit) = self
            .store
            .get_or_add(key.clone(), || self.read_revision(&key, org, repo))
            .await?;

        if hit {
            debug!(key = %key, "Cache hit");
            self.metrics.record_hit(org, repo);
        } else {
            debug!(key = %key, "Cache miss");
            self.metrics.record_miss(org, repo);
            self.metrics.adjust_size(org, repo, 1);
        }

        value.downcast::<ProwYaml>().map_err(|_| {
            error!(key = %key, "Cache entry holds a value of an unexpected type");
            InRepoConfigError::UnexpectedValue {
                key: key.to_string(),
            }
        })
    }

    async fn read_revision(
        &self,
        key: &CacheKey,
        org: &str,
        repo: &str,
    ) -> InRepoConfigResult<StoredValue> {
        let parts = key.parts()?;
        let client = self.clients.client_for(org, repo).await?;
        let method = self.config.merge_method(org, repo);
        client
            .merge_and_checkout(&parts.base_sha, method, &parts.head_shas)
            .await?;

        let directory = client.directory().to_path_buf();
        let prow_yaml = tokio::task::spawn_blocking(move || read_prow_yaml(&directory))
            .await
            .map_err(|e| InRepoConfigError::TaskFailed {
                reason: e.to_string(),
            })??;
        client.release();

        info!(
            identifier = %parts.identifier,
            base = %parts.base_sha,
            presubmits = prow_yaml.presubmits.len(),
            postsubmits = prow_yaml.postsubmits.len(),
            "Read in-repo configuration"
        );
        let value: StoredValue = Arc::new(prow_yaml);
        Ok(value)
    }

    /// A private copy of the bundle with configuration defaults applied.
    pub async fn get_prow_yaml(
        &self,
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> InRepoConfigResult<ProwYaml> {
        let shared = self.get(identifier, base, heads).await?;
        let mut prow_yaml = ProwYaml::clone(&shared);
        self.config
            .default_and_validate_prow_yaml(&mut prow_yaml, identifier)?;
        Ok(prow_yaml)
    }

    /// The shared bundle, without configuration defaults.
    pub async fn get_prow_yaml_without_defaults(
        &self,
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> InRepoConfigResult<Arc<ProwYaml>> {
        self.get(identifier, base, heads).await
    }

    /// Static presubmits of the repository followed by its in-repo ones.
    pub async fn presubmits(
        &self,
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> InRepoConfigResult<Vec<Presubmit>> {
        let (org, repo) = split_identifier(identifier)?;
        let in_repo = self.get_prow_yaml(identifier, base, heads).await?;
        let mut presubmits = self.config.presubmits_for(org, repo).to_vec();
        presubmits.extend(in_repo.presubmits);
        Ok(presubmits)
    }

    /// Static postsubmits of the repository followed by its in-repo ones.
    pub async fn postsubmits(
        &self,
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> InRepoConfigResult<Vec<Postsubmit>> {
        let (org, repo) = split_identifier(identifier)?;
        let in_repo = self.get_prow_yaml(identifier, base, heads).await?;
        let mut postsubmits = self.config.postsubmits_for(org, repo).to_vec();
        postsubmits.extend(in_repo.postsubmits);
        Ok(postsubmits)
    }

    /// Merge-queue context policy of a branch, counting in-repo presubmits.
    pub async fn tide_context_policy(
        &self,
        identifier: &str,
        branch: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> InRepoConfigResult<ResolvedContextPolicy> {
        let (org, repo) = split_identifier(identifier)?;
        let in_repo = self.get_prow_yaml(identifier, base, heads).await?;
        Ok(self
            .config
            .tide_context_policy(org, repo, branch, &in_repo.presubmits)?)
    }

    /// Branch protection of a branch, counting in-repo presubmits.
    pub async fn branch_protection(
        &self,
        identifier: &str,
        branch: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> InRepoConfigResult<Option<Policy>> {
        let (org, repo) = split_identifier(identifier)?;
        let presubmits = self.presubmits(identifier, base, heads).await?;
        Ok(self
            .config
            .get_branch_protection(org, repo, branch, &presubmits)?)
    }

    /// Drops a stored bundle. Returns `false` when nothing was stored.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.store.remove(key)
    }

    /// Stored keys, most recently used first.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
