//! Internal metrics collection.
//!
//! Counters are incremented by the engines and logged as a structured
//! summary after each scheduled run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 50ms, 100ms, 500ms, 1s, 5s, 10s, 30s, 1m, 5m, 10m
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [
        10, 50, 100, 500, 1_000, 5_000, 10_000, 30_000, 60_000, 300_000, 600_000,
    ];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the aggregation engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Job lifecycle
    pub jobs_run: Counter,
    pub jobs_skipped_lock: Counter,
    pub jobs_failed: Counter,

    // Rollup metrics
    pub rollup_rows_written: Counter,
    pub games_failed: Counter,
    pub facts_skipped: Counter,

    // Sync metrics
    pub sync_batches: Counter,
    pub sync_rows: Counter,
    pub sync_cycles_skipped: Counter,
    pub sync_errors: Counter,

    // Latency histograms
    pub job_duration_ms: Histogram,
    pub sync_batch_latency_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub jobs_run: u64,
    pub jobs_skipped_lock: u64,
    pub jobs_failed: u64,
    pub rollup_rows_written: u64,
    pub games_failed: u64,
    pub facts_skipped: u64,
    pub sync_batches: u64,
    pub sync_rows: u64,
    pub sync_cycles_skipped: u64,
    pub sync_errors: u64,
    pub job_duration_mean_ms: f64,
    pub sync_batch_latency_mean_ms: f64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            jobs_run: self.jobs_run.get(),
            jobs_skipped_lock: self.jobs_skipped_lock.get(),
            jobs_failed: self.jobs_failed.get(),
            rollup_rows_written: self.rollup_rows_written.get(),
            games_failed: self.games_failed.get(),
            facts_skipped: self.facts_skipped.get(),
            sync_batches: self.sync_batches.get(),
            sync_rows: self.sync_rows.get(),
            sync_cycles_skipped: self.sync_cycles_skipped.get(),
            sync_errors: self.sync_errors.get(),
            job_duration_mean_ms: self.job_duration_ms.mean(),
            sync_batch_latency_mean_ms: self.sync_batch_latency_ms.mean(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
