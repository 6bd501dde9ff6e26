//! Reuse of repository clients across requests.
//!
//! The cache keeps one client per `org/repo`. A caller gets an exclusive
//! [`ClientHandle`]; a second caller for the same repository waits until the
//! first handle is dropped. Callers for different repositories only contend
//! on the short-lived map lock, except while a new client is being created:
//! creation happens under the map lock so that a repository is never cloned
//! twice.

use crate::client::{ClientFactory, RepoClient};
use crate::errors::RepoClientResult;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;

type SharedClient = Arc<Mutex<Box<dyn RepoClient>>>;

/// Exclusive access to a cached client.
///
/// Dropping the handle releases the client; its working copy stays on disk
/// for the next caller.
pub struct ClientHandle {
    repository: String,
    guard: OwnedMutexGuard<Box<dyn RepoClient>>,
}

impl ClientHandle {
    /// `org/repo` of the client.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Releases the client. Equivalent to dropping the handle.
    pub fn release(self) {
        debug!(repository = %self.repository, "Released repository client");
    }
}

impl Deref for ClientHandle {
    type Target = dyn RepoClient;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("repository", &self.repository)
            .field("directory", &self.guard.directory())
            .finish()
    }
}

/// Per-repository client cache around a [`ClientFactory`].
pub struct ClientCache {
    factory: Arc<dyn ClientFactory>,
    clients: Mutex<HashMap<String, SharedClient>>,
}

impl ClientCache {
    /// Wraps a factory. An absent factory yields an absent cache.
    pub fn new(factory: Option<Arc<dyn ClientFactory>>) -> Option<Self> {
        factory.map(|factory| Self {
            factory,
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// Returns an exclusive handle on the client for `org/repo`, creating the
    /// client on first use. A reused client fetches before it is handed out.
    ///
    /// # Errors
    ///
    /// Propagates factory errors; nothing is cached for a failed creation.
    #[instrument(skip(self))]
    pub async fn client_for(&self, org: &str, repo: &str) -> RepoClientResult<ClientHandle> {
        let repository = format!("{}/{}", org, repo);

        let shared = {
            let mut clients = self.clients.lock().await;
            match clients.get(&repository) {
                Some(existing) => existing.clone(),
                None => {
                    let client = self.factory.client_for(org, repo).await?;
                    let shared: SharedClient = Arc::new(Mutex::new(client));
                    // Locked before it becomes visible so nobody can overtake
                    // the creator.
                    let guard = shared.clone().lock_owned().await;
                    clients.insert(repository.clone(), shared);
                    info!(repository = %repository, "Created repository client");
                    return Ok(ClientHandle { repository, guard });
                }
            }
        };

        debug!(repository = %repository, "Waiting for cached repository client");
        let guard = shared.lock_owned().await;
        debug!(repository = %repository, "Acquired cached repository client");
        guard.fetch().await?;
        Ok(ClientHandle { repository, guard })
    }

    /// Number of repositories with a client.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
