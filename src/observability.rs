//! Observability (metrics, tracing)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::migration::{JobResult, OverallStatus};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_started: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    records_written: AtomicU64,
    records_converted: AtomicU64,
    blobs_copied: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_started", "Metric incremented");
    }

    /// Fold a finished job into the counters
    pub fn job_finished(&self, result: &JobResult) {
        let counter = match result.status {
            OverallStatus::Completed => {
                self.jobs_completed.fetch_add(1, Ordering::Relaxed);
                "jobs_completed"
            }
            OverallStatus::Cancelled => {
                self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
                "jobs_cancelled"
            }
            _ => {
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                "jobs_failed"
            }
        };
        tracing::debug!(counter, "Metric incremented");

        let totals = result.totals();
        self.records_written
            .fetch_add(totals.migrated, Ordering::Relaxed);
        self.records_converted
            .fetch_add(totals.converted, Ordering::Relaxed);
        if let Some(blobs) = &result.blobs {
            self.blobs_copied.fetch_add(blobs.migrated, Ordering::Relaxed);
        }
        tracing::debug!(
            records_written = totals.migrated,
            records_converted = totals.converted,
            "Metrics updated"
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            records_converted: self.records_converted.load(Ordering::Relaxed),
            blobs_copied: self.blobs_copied.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub records_written: u64,
    pub records_converted: u64,
    pub blobs_copied: u64,
}
