// ═══════════════════════════════════════════════════════════════
// BATCH METRICS - What happened across every file in one run
// ═══════════════════════════════════════════════════════════════
//
// `clean` fans inputs out over rayon workers, each running its own
// pipeline. The workers share nothing except this collector: a handful
// of atomic counters bumped once per file. At the end the binary takes a
// snapshot and prints one summary line, or writes it as JSON.

use std::time::Instant;

use portable_atomic::{AtomicF64, AtomicU64, Ordering};
use serde::Serialize;

use crate::cleaner::CleaningReport;

/// Point-in-time copy of the counters, ready for serialization.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BatchSnapshot {
    pub files_processed: u64,
    pub files_failed: u64,
    pub rows_in: u64,
    pub rows_out: u64,
    pub rows_dropped: u64,
    pub values_changed: u64,
    pub cells_flagged: u64,
    /// Summed per-file pipeline time. Exceeds wall time when files run in parallel.
    pub busy_seconds: f64,
    pub elapsed_seconds: f64,
}

impl BatchSnapshot {
    /// Share of input rows that survived, across the whole batch.
    pub fn retention_rate(&self) -> Option<f64> {
        (self.rows_in > 0).then(|| self.rows_out as f64 / self.rows_in as f64 * 100.0)
    }
}

/// Lock-free counters shared by every worker in a batch.
pub struct BatchMetrics {
    files_processed: AtomicU64,
    files_failed: AtomicU64,
    rows_in: AtomicU64,
    rows_out: AtomicU64,
    rows_dropped: AtomicU64,
    values_changed: AtomicU64,
    cells_flagged: AtomicU64,
    busy_seconds: AtomicF64,
    start_time: Instant,
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self {
            files_processed: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            rows_in: AtomicU64::new(0),
            rows_out: AtomicU64::new(0),
            rows_dropped: AtomicU64::new(0),
            values_changed: AtomicU64::new(0),
            cells_flagged: AtomicU64::new(0),
            busy_seconds: AtomicF64::new(0.0),
            start_time: Instant::now(),
        }
    }

    /// Fold one finished file into the totals.
    pub fn record_report(&self, report: &CleaningReport, busy_seconds: f64) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.rows_in
            .fetch_add(report.original_rows as u64, Ordering::Relaxed);
        self.rows_out
            .fetch_add(report.final_rows as u64, Ordering::Relaxed);
        self.rows_dropped
            .fetch_add(report.rows_dropped() as u64, Ordering::Relaxed);
        self.values_changed
            .fetch_add(report.values_changed() as u64, Ordering::Relaxed);
        self.cells_flagged
            .fetch_add(report.issues.len() as u64, Ordering::Relaxed);
        self.busy_seconds.fetch_add(busy_seconds, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            rows_in: self.rows_in.load(Ordering::Relaxed),
            rows_out: self.rows_out.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped.load(Ordering::Relaxed),
            values_changed: self.values_changed.load(Ordering::Relaxed),
            cells_flagged: self.cells_flagged.load(Ordering::Relaxed),
            busy_seconds: self.busy_seconds.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}
