//! Revision-keyed cache of job definitions stored inside repositories.
//!
//! A change is identified by a repository, a base revision and the head
//! revisions merged on top of it. [`InRepoConfigCache`] reads the job
//! definitions of that merge once and shares the result between callers,
//! using a bounded [`LruStore`] that never runs two constructions of the same
//! key at the same time.
//!
//! # Example
//!
//! ```rust,no_run
//! use inrepo_cache::{InRepoConfigCache, KnownRef, NoOpCacheMetrics};
//! use prow_config::ProwConfig;
//! use repo_client::{ClientCache, ClientFactory, GitClientFactory};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Arc::new(ProwConfig::load("config.toml".as_ref())?);
//! let factory: Arc<dyn ClientFactory> = Arc::new(GitClientFactory::new(
//!     "https://github.com",
//!     PathBuf::from("/var/cache/clones"),
//! ));
//! let clients = Arc::new(ClientCache::new(Some(factory)).ok_or_else(|| anyhow::anyhow!("no factory"))?);
//! let cache = InRepoConfigCache::new(config, clients, Arc::new(NoOpCacheMetrics))?;
//!
//! let presubmits = cache
//!     .presubmits("kubernetes/test-infra", &KnownRef::new("abc123"), &[&KnownRef::new("def456")])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod errors;
pub mod key;
pub mod lru_store;
pub mod metrics;
pub mod refs;

pub use cache::{new_shared_store, InRepoConfigCache, SharedStore, StoredValue};
pub use errors::{InRepoConfigError, InRepoConfigResult};
pub use key::{CacheKey, CacheKeyParts};
pub use lru_store::{EvictionCallback, EvictionReason, LruStore};
pub use metrics::{CacheMetrics, NoOpCacheMetrics, PrometheusCacheMetrics};
pub use refs::{KnownRef, RefGetter};
