//! Version-control client abstraction.
//!
//! A [`RepoClient`] owns one working copy of one repository. Callers get
//! exclusive access to it through the client cache, so implementations do not
//! need to guard against concurrent use of the same working copy.

use crate::errors::RepoClientResult;
use async_trait::async_trait;
use prow_config::MergeMethod;
use std::path::Path;

/// Operations on a repository working copy.
#[async_trait]
pub trait RepoClient: Send + Sync {
    /// Root of the working copy.
    fn directory(&self) -> &Path;

    /// `org/repo` this client works on.
    fn repository(&self) -> &str;

    /// Updates remote-tracking references from the remote.
    async fn fetch(&self) -> RepoClientResult<()>;

    /// Checks out a revision with a detached HEAD, discarding local changes.
    async fn checkout(&self, revision: &str) -> RepoClientResult<()>;

    /// Checks out `base_sha` and merges every head onto it in order.
    ///
    /// Revisions missing locally are fetched once. Conflicts are errors and
    /// leave the working copy in an unspecified state; the next checkout
    /// resets it.
    async fn merge_and_checkout(
        &self,
        base_sha: &str,
        method: MergeMethod,
        head_shas: &[String],
    ) -> RepoClientResult<()>;

    /// Removes the working copy from disk.
    async fn clean(&self) -> RepoClientResult<()>;
}

/// Creates clients for repositories.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Returns a client with a working copy of `org/repo`.
    async fn client_for(&self, org: &str, repo: &str) -> RepoClientResult<Box<dyn RepoClient>>;
}
