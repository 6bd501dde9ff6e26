//! Metrics recording for the in-repo configuration cache.
//!
//! The cache reports into a [`CacheMetrics`] object handed to it at
//! construction. [`PrometheusCacheMetrics`] registers its collectors in a
//! caller-supplied registry; [`NoOpCacheMetrics`] discards everything.
//!
//! Recording never fails: a metrics problem must not fail resolution.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::time::Duration;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Sink for cache observations, labelled by organization and repository.
pub trait CacheMetrics: Send + Sync {
    /// A lookup reached the store.
    fn record_lookup(&self, org: &str, repo: &str);

    fn record_hit(&self, org: &str, repo: &str);

    fn record_miss(&self, org: &str, repo: &str);

    /// An entry was displaced to make room.
    fn record_forced_eviction(&self, org: &str, repo: &str);

    /// An entry was invalidated, or its construction failed.
    fn record_manual_eviction(&self, org: &str, repo: &str);

    /// Adjusts the number of resident entries of a repository.
    fn adjust_size(&self, org: &str, repo: &str, delta: i64);

    /// End-to-end duration of a lookup.
    fn observe_duration(&self, org: &str, repo: &str, duration: Duration);
}

/// Prometheus collectors for the cache.
///
/// # Metrics
/// - `in_repo_config_cache_lookups_total` (Counter)
/// - `in_repo_config_cache_hits_total` (Counter)
/// - `in_repo_config_cache_misses_total` (Counter)
/// - `in_repo_config_cache_forced_evictions_total` (Counter)
/// - `in_repo_config_cache_manual_evictions_total` (Counter)
/// - `in_repo_config_cache_size` (Gauge)
/// - `in_repo_config_cache_duration_seconds` (Histogram)
pub struct PrometheusCacheMetrics {
    lookups: IntCounterVec,
    hits: IntCounterVec,
    misses: IntCounterVec,
    forced_evictions: IntCounterVec,
    manual_evictions: IntCounterVec,
    size: IntGaugeVec,
    duration: HistogramVec,
}

const LABELS: &[&str] = &["org", "repo"];

impl PrometheusCacheMetrics {
    /// Creates the collectors and registers them in `registry`.
    ///
    /// # Errors
    ///
    /// Fails when a collector with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let counter = |name: &str, help: &str| -> Result<IntCounterVec, prometheus::Error> {
            let counter = IntCounterVec::new(Opts::new(name, help), LABELS)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let lookups = counter(
            "in_repo_config_cache_lookups_total",
            "Lookups of in-repo configuration in the cache.",
        )?;
        let hits = counter(
            "in_repo_config_cache_hits_total",
            "Lookups answered from the cache.",
        )?;
        let misses = counter(
            "in_repo_config_cache_misses_total",
            "Lookups that had to read the repository.",
        )?;
        let forced_evictions = counter(
            "in_repo_config_cache_forced_evictions_total",
            "Entries evicted because the cache was full.",
        )?;
        let manual_evictions = counter(
            "in_repo_config_cache_manual_evictions_total",
            "Entries invalidated explicitly or after a failed read.",
        )?;

        let size = IntGaugeVec::new(
            Opts::new(
                "in_repo_config_cache_size",
                "Resident cache entries per repository.",
            ),
            LABELS,
        )?;
        registry.register(Box::new(size.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "in_repo_config_cache_duration_seconds",
                "Time taken to resolve in-repo configuration.",
            ),
            LABELS,
        )?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            lookups,
            hits,
            misses,
            forced_evictions,
            manual_evictions,
            size,
            duration,
        })
    }
}

impl CacheMetrics for PrometheusCacheMetrics {
    fn record_lookup(&self, org: &str, repo: &str) {
        self.lookups.with_label_values(&[org, repo]).inc();
    }

    fn record_hit(&self, org: &str, repo: &str) {
        self.hits.with_label_values(&[org, repo]).inc();
    }

    fn record_miss(&self, org: &str, repo: &str) {
        self.misses.with_label_values(&[org, repo]).inc();
    }

    fn record_forced_eviction(&self, org: &str, repo: &str) {
        self.forced_evictions.with_label_values(&[org, repo]).inc();
    }

    fn record_manual_eviction(&self, org: &str, repo: &str) {
        self.manual_evictions.with_label_values(&[org, repo]).inc();
    }

    fn adjust_size(&self, org: &str, repo: &str, delta: i64) {
        self.size.with_label_values(&[org, repo]).add(delta);
    }

    fn observe_duration(&self, org: &str, repo: &str, duration: Duration) {
        self.duration
            .with_label_values(&[org, repo])
            .observe(duration.as_secs_f64());
    }
}

/// Metrics sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCacheMetrics;

impl CacheMetrics for NoOpCacheMetrics {
    fn record_lookup(&self, _org: &str, _repo: &str) {}
    fn record_hit(&self, _org: &str, _repo: &str) {}
    fn record_miss(&self, _org: &str, _repo: &str) {}
    fn record_forced_eviction(&self, _org: &str, _repo: &str) {}
    fn record_manual_eviction(&self, _org: &str, _repo: &str) {}
    fn adjust_size(&self, _org: &str, _repo: &str, _delta: i64) {}
    fn observe_duration(&self, _org: &str, _repo: &str, _duration: Duration) {}
}
