//! Lazily resolved revisions.

use async_trait::async_trait;

#[cfg(test)]
#[path = "refs_tests.rs"]
mod tests;

/// Produces a revision on demand.
///
/// Plain closures returning `anyhow::Result<String>` are getters, so callers
/// can pass either a known SHA or a lookup that may fail.
#[async_trait]
pub trait RefGetter: Send + Sync {
    async fn resolve(&self) -> anyhow::Result<String>;
}

#[async_trait]
impl<F> RefGetter for F
where
    F: Fn() -> anyhow::Result<String> + Send + Sync,
{
    async fn resolve(&self) -> anyhow::Result<String> {
        self()
    }
}

/// A revision that is already known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownRef(pub String);

impl KnownRef {
    pub fn new(sha: &str) -> Self {
        Self(sha.to_string())
    }
}

#[async_trait]
impl RefGetter for KnownRef {
    async fn resolve(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}
