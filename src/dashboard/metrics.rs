//! Prometheus metrics for cache refreshes and job actions.

use std::time::Duration;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Dashboard metrics, kept in a registry of their own.
#[derive(Clone)]
pub struct DashboardMetrics {
    registry: Registry,
    cache_refreshes: IntCounterVec,
    cache_refresh_duration: HistogramVec,
    jobs_triggered: IntCounterVec,
    job_watchers: IntGauge,
}

impl DashboardMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let cache_refreshes = IntCounterVec::new(
            Opts::new(
                "envdash_cache_refreshes_total",
                "Cache refresh cycles by cache and outcome",
            ),
            &["cache", "outcome"],
        )?;
        let cache_refresh_duration = HistogramVec::new(
            HistogramOpts::new(
                "envdash_cache_refresh_duration_seconds",
                "Time taken by a cache refresh cycle",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["cache"],
        )?;
        let jobs_triggered = IntCounterVec::new(
            Opts::new("envdash_jobs_triggered_total", "Deploy jobs played or retried"),
            &["action"],
        )?;
        let job_watchers = IntGauge::new(
            "envdash_job_watchers_active",
            "Job watchers still following a job",
        )?;

        registry.register(Box::new(cache_refreshes.clone()))?;
        registry.register(Box::new(cache_refresh_duration.clone()))?;
        registry.register(Box::new(jobs_triggered.clone()))?;
        registry.register(Box::new(job_watchers.clone()))?;

        Ok(Self {
            registry,
            cache_refreshes,
            cache_refresh_duration,
            jobs_triggered,
            job_watchers,
        })
    }

    pub fn observe_refresh(&self, cache: &str, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.cache_refreshes
            .with_label_values(&[cache, outcome])
            .inc();
        self.cache_refresh_duration
            .with_label_values(&[cache])
            .observe(elapsed.as_secs_f64());
    }

    /// `action` is `play` or `retry`.
    pub fn record_trigger(&self, action: &str) {
        self.jobs_triggered.with_label_values(&[action]).inc();
    }

    pub fn set_active_watchers(&self, active: usize) {
        self.job_watchers.set(active as i64);
    }

    /// Text exposition of every registered metric.
    pub fn gather(&self) -> prometheus::Result<String> {
        let metric_families = self.registry.gather();
        TextEncoder::new().encode_to_string(&metric_families)
    }
}
