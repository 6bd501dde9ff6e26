//! Tests for the repository client cache.

use super::*;
use crate::errors::RepoClientError;
use async_trait::async_trait;
use prow_config::MergeMethod;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing_test::traced_test;

// ============================================================================
// Test Doubles
// ============================================================================

struct FakeClient {
    directory: PathBuf,
    repository: String,
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl RepoClient for FakeClient {
    fn directory(&self) -> &Path {
        &self.directory
    }

    fn repository(&self) -> &str {
        &self.repository
    }

    async fn fetch(&self) -> RepoClientResult<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn checkout(&self, _revision: &str) -> RepoClientResult<()> {
        Ok(())
    }

    async fn merge_and_checkout(
        &self,
        _base_sha: &str,
        _method: MergeMethod,
        _head_shas: &[String],
    ) -> RepoClientResult<()> {
        Ok(())
    }

    async fn clean(&self) -> RepoClientResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeFactory {
    created: AtomicUsize,
    fetches: Arc<AtomicUsize>,
    broken: Option<String>,
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn client_for(&self, org: &str, repo: &str) -> RepoClientResult<Box<dyn RepoClient>> {
        let repository = format!("{}/{}", org, repo);
        if self.broken.as_deref() == Some(repository.as_str()) {
            return Err(RepoClientError::CloneFailed {
                repository,
                reason: "remote unavailable".to_string(),
            });
        }
        let id = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeClient {
            directory: PathBuf::from(format!("/clones/{}", id)),
            repository,
            fetches: self.fetches.clone(),
        }))
    }
}

fn cache_with(factory: Arc<FakeFactory>) -> ClientCache {
    let factory: Arc<dyn ClientFactory> = factory;
    ClientCache::new(Some(factory)).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_absent_factory_yields_absent_cache() {
    assert!(ClientCache::new(None).is_none());
}

#[tokio::test]
async fn test_client_is_reused_after_release() {
    let factory = Arc::new(FakeFactory::default());
    let cache = cache_with(factory.clone());

    let first = cache.client_for("org", "repo").await.unwrap();
    let directory = first.directory().to_path_buf();
    assert_eq!(first.repository(), "org/repo");
    first.release();

    let second = cache.client_for("org", "repo").await.unwrap();

    assert_eq!(second.directory(), directory.as_path());
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(factory.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
#[traced_test]
async fn test_client_creation_is_logged() {
    let cache = cache_with(Arc::new(FakeFactory::default()));

    cache.client_for("org", "repo").await.unwrap().release();

    assert!(logs_contain("Created repository client"));
}

#[tokio::test]
async fn test_second_caller_waits_for_release() {
    let cache = cache_with(Arc::new(FakeFactory::default()));

    let held = cache.client_for("org", "repo").await.unwrap();
    let blocked = timeout(Duration::from_millis(50), cache.client_for("org", "repo")).await;
    assert!(blocked.is_err(), "second caller must wait while the handle is held");

    drop(held);
    let acquired = timeout(Duration::from_secs(5), cache.client_for("org", "repo")).await;
    assert!(acquired.is_ok());
}

#[tokio::test]
async fn test_different_repositories_do_not_block_each_other() {
    let factory = Arc::new(FakeFactory::default());
    let cache = cache_with(factory.clone());

    let _a = cache.client_for("org", "a").await.unwrap();
    let b = timeout(Duration::from_secs(5), cache.client_for("org", "b"))
        .await
        .expect("other repositories must not wait")
        .unwrap();

    assert_eq!(b.repository(), "org/b");
    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_creation_is_not_cached() {
    let factory = Arc::new(FakeFactory {
        broken: Some("org/broken".to_string()),
        ..Default::default()
    });
    let cache = cache_with(factory);

    let error = cache.client_for("org", "broken").await.unwrap_err();

    assert!(matches!(error, RepoClientError::CloneFailed { .. }));
    assert!(cache.is_empty().await);
    assert!(cache.client_for("org", "fine").await.is_ok());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_client() {
    let factory = Arc::new(FakeFactory::default());
    let cache = Arc::new(cache_with(factory.clone()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let handle = cache.client_for("org", "repo").await.unwrap();
                handle.directory().to_path_buf()
            })
        })
        .collect();

    let mut directories = Vec::new();
    for task in tasks {
        directories.push(task.await.unwrap());
    }

    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert!(directories.iter().all(|d| d == &directories[0]));
}
