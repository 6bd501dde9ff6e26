//! Version-control clients for reading repository content.
//!
//! [`RepoClient`] is the seam to version control: it prepares a working copy
//! at a base revision with a set of heads merged on top. [`GitRepoClient`] is
//! the `git2` implementation, and [`ClientCache`] hands out exclusive,
//! reusable clients per repository.

pub mod cache;
pub mod client;
pub mod errors;
pub mod git;

pub use cache::{ClientCache, ClientHandle};
pub use client::{ClientFactory, RepoClient};
pub use errors::{RepoClientError, RepoClientResult};
pub use git::{GitClientFactory, GitRepoClient};
