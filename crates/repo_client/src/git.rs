//! `git2`-backed repository client.
//!
//! Every operation reopens the repository from its directory inside
//! `spawn_blocking`, so the async runtime never blocks on libgit2 and no
//! `git2::Repository` handle has to cross threads.
//!
//! Working copies are laid out as `<cache_dir>/<org>/<repo>` and cloned from
//! `<remote_base>/<org>/<repo>`. The remote base may be a URL or a local path.

use crate::client::{ClientFactory, RepoClient};
use crate::errors::{RepoClientError, RepoClientResult};
use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{Commit, Oid, Repository, Signature};
use prow_config::MergeMethod;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;

const COMMITTER_NAME: &str = "Prow";
const COMMITTER_EMAIL: &str = "prow@example.com";

/// Pull request heads, fetched next to origin's configured refspecs.
const PULL_REFSPEC: &str = "+refs/pull/*/head:refs/remotes/origin/pr/*";

fn git_error(operation: &str) -> impl FnOnce(git2::Error) -> RepoClientError + '_ {
    move |e| RepoClientError::GitError {
        operation: operation.to_string(),
        reason: e.message().to_string(),
    }
}

/// Runs a libgit2 job on the blocking thread pool.
async fn blocking<T, F>(job: F) -> RepoClientResult<T>
where
    F: FnOnce() -> RepoClientResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| RepoClientError::TaskFailed {
            reason: e.to_string(),
        })?
}

/// Client for one working copy on local disk.
#[derive(Debug, Clone)]
pub struct GitRepoClient {
    directory: PathBuf,
    repository: String,
}

impl GitRepoClient {
    /// Wraps an existing working copy.
    pub fn new(directory: PathBuf, repository: &str) -> Self {
        Self {
            directory,
            repository: repository.to_string(),
        }
    }

    fn open(&self) -> RepoClientResult<Repository> {
        Repository::open(&self.directory).map_err(git_error("open"))
    }
}

fn fetch_failed(repository: &str) -> impl Fn(git2::Error) -> RepoClientError + '_ {
    move |e| RepoClientError::FetchFailed {
        repository: repository.to_string(),
        reason: e.message().to_string(),
    }
}

/// Fetches origin's configured refspecs plus pull request heads.
fn fetch_origin(repo: &Repository, repository: &str) -> RepoClientResult<()> {
    let mut remote = repo.find_remote("origin").map_err(fetch_failed(repository))?;
    let mut refspecs: Vec<String> = remote
        .fetch_refspecs()
        .map_err(fetch_failed(repository))?
        .iter()
        .flatten()
        .map(str::to_string)
        .collect();
    refspecs.push(PULL_REFSPEC.to_string());
    remote
        .fetch(&refspecs, None, None)
        .map_err(fetch_failed(repository))?;
    debug!(repository = repository, "Fetched origin");
    Ok(())
}

/// Fetches a single commit by id. Servers may refuse ids they do not
/// advertise.
fn fetch_commit(repo: &Repository, repository: &str, oid: Oid) -> RepoClientResult<()> {
    let mut remote = repo.find_remote("origin").map_err(fetch_failed(repository))?;
    remote
        .fetch(&[oid.to_string()], None, None)
        .map_err(fetch_failed(repository))
}

/// Resolves a revision, fetching when it is not known locally.
///
/// A missing commit id is first fetched directly, then through origin's
/// refspecs and pull request heads.
fn resolve_commit<'r>(
    repo: &'r Repository,
    repository: &str,
    revision: &str,
) -> RepoClientResult<Commit<'r>> {
    let lookup = |repo: &'r Repository| -> Option<Commit<'r>> {
        let by_id = Oid::from_str(revision)
            .ok()
            .and_then(|oid| repo.find_commit(oid).ok());
        by_id.or_else(|| {
            repo.revparse_single(revision)
                .ok()
                .and_then(|object| object.peel_to_commit().ok())
        })
    };

    if let Some(commit) = lookup(repo) {
        return Ok(commit);
    }
    debug!(
        repository = repository,
        revision = revision,
        "Revision not found locally, fetching"
    );
    if let Ok(oid) = Oid::from_str(revision) {
        match fetch_commit(repo, repository, oid) {
            Ok(()) => {
                if let Some(commit) = lookup(repo) {
                    return Ok(commit);
                }
            }
            Err(e) => debug!(revision = revision, error = %e, "Fetching commit by id failed"),
        }
    }
    fetch_origin(repo, repository)?;
    lookup(repo).ok_or_else(|| RepoClientError::RevisionNotFound {
        repository: repository.to_string(),
        revision: revision.to_string(),
    })
}

fn checkout_commit(repo: &Repository, commit: &Commit<'_>) -> RepoClientResult<()> {
    let mut options = CheckoutBuilder::new();
    options.force().remove_untracked(true);
    repo.checkout_tree(commit.as_object(), Some(&mut options))
        .map_err(git_error("checkout"))?;
    repo.set_head_detached(commit.id())
        .map_err(git_error("checkout"))
}

/// Merges `head` onto the commit at HEAD and checks out the result.
fn merge_head(
    repo: &Repository,
    repository: &str,
    base: &str,
    head: &str,
    method: MergeMethod,
) -> RepoClientResult<()> {
    let ours = repo
        .head()
        .and_then(|reference| reference.peel_to_commit())
        .map_err(git_error("merge"))?;
    let theirs = resolve_commit(repo, repository, head)?;

    let mut index = repo
        .merge_commits(&ours, &theirs, None)
        .map_err(git_error("merge"))?;
    if index.has_conflicts() {
        return Err(RepoClientError::MergeConflict {
            repository: repository.to_string(),
            base: base.to_string(),
            head: head.to_string(),
        });
    }
    let tree_oid = index.write_tree_to(repo).map_err(git_error("merge"))?;
    let tree = repo.find_tree(tree_oid).map_err(git_error("merge"))?;
    let signature =
        Signature::now(COMMITTER_NAME, COMMITTER_EMAIL).map_err(git_error("signature"))?;

    let parents: Vec<&Commit<'_>> = match method {
        MergeMethod::Merge => vec![&ours, &theirs],
        MergeMethod::Squash => vec![&ours],
    };
    let message = format!("Merge {} into {}", head, base);
    let merged = repo
        .commit(None, &signature, &signature, &message, &tree, &parents)
        .map_err(git_error("commit"))?;
    let merged = repo.find_commit(merged).map_err(git_error("commit"))?;

    checkout_commit(repo, &merged)
}

#[async_trait]
impl RepoClient for GitRepoClient {
    fn directory(&self) -> &Path {
        &self.directory
    }

    fn repository(&self) -> &str {
        &self.repository
    }

    async fn fetch(&self) -> RepoClientResult<()> {
        let client = self.clone();
        blocking(move || fetch_origin(&client.open()?, &client.repository)).await
    }

    async fn checkout(&self, revision: &str) -> RepoClientResult<()> {
        let client = self.clone();
        let revision = revision.to_string();
        blocking(move || {
            let repo = client.open()?;
            let commit = resolve_commit(&repo, &client.repository, &revision)?;
            checkout_commit(&repo, &commit)
        })
        .await
    }

    #[instrument(skip(self, head_shas), fields(repository = %self.repository, heads = head_shas.len()))]
    async fn merge_and_checkout(
        &self,
        base_sha: &str,
        method: MergeMethod,
        head_shas: &[String],
    ) -> RepoClientResult<()> {
        let client = self.clone();
        let base_sha = base_sha.to_string();
        let head_shas = head_shas.to_vec();
        blocking(move || {
            let repo = client.open()?;
            let base = resolve_commit(&repo, &client.repository, &base_sha)?;
            checkout_commit(&repo, &base)?;
            for head in &head_shas {
                merge_head(&repo, &client.repository, &base_sha, head, method)?;
            }
            debug!(method = ?method, "Merged heads onto base");
            Ok(())
        })
        .await
    }

    async fn clean(&self) -> RepoClientResult<()> {
        let directory = self.directory.clone();
        blocking(move || {
            std::fs::remove_dir_all(&directory).map_err(|e| RepoClientError::FileSystemError {
                path: directory.display().to_string(),
                reason: e.to_string(),
            })
        })
        .await
    }
}

/// Clones repositories into a local cache directory.
#[derive(Debug, Clone)]
pub struct GitClientFactory {
    remote_base: String,
    cache_dir: PathBuf,
}

impl GitClientFactory {
    pub fn new(remote_base: &str, cache_dir: PathBuf) -> Self {
        Self {
            remote_base: remote_base.trim_end_matches('/').to_string(),
            cache_dir,
        }
    }

    /// Clone URL of a repository.
    pub fn remote_url(&self, org: &str, repo: &str) -> String {
        format!("{}/{}/{}", self.remote_base, org, repo)
    }
}

#[async_trait]
impl ClientFactory for GitClientFactory {
    #[instrument(skip(self))]
    async fn client_for(&self, org: &str, repo: &str) -> RepoClientResult<Box<dyn RepoClient>> {
        let repository = format!("{}/{}", org, repo);
        let directory = self.cache_dir.join(org).join(repo);
        let url = self.remote_url(org, repo);

        let client = GitRepoClient::new(directory.clone(), &repository);
        blocking(move || {
            if directory.join(".git").is_dir() {
                debug!(directory = %directory.display(), "Reusing existing clone");
                let existing = Repository::open(&directory).map_err(git_error("open"))?;
                return fetch_origin(&existing, &repository);
            }

            if let Some(parent) = directory.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RepoClientError::FileSystemError {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
            Repository::clone(&url, &directory).map_err(|e| RepoClientError::CloneFailed {
                repository: repository.clone(),
                reason: e.message().to_string(),
            })?;
            info!(repository = %repository, url = %url, "Cloned repository");
            Ok(())
        })
        .await?;

        Ok(Box::new(client))
    }
}
