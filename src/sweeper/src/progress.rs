//! Run progress tracking and periodic reporting.
//!
//! Purely observational: the counters never gate a decision. The runner is
//! the only writer; the reporter task reads them on a fixed interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Thread-safe counters for one sweep run.
#[derive(Debug, Clone, Default)]
pub struct SweepProgress {
    inner: Arc<ProgressInner>,
}

#[derive(Debug, Default)]
struct ProgressInner {
    parts_total: AtomicUsize,
    parts_done: AtomicUsize,
    part_rows: AtomicU64,
    rows_total: AtomicU64,
    groups: AtomicU64,
    groups_failed: AtomicU64,
    deleted_keys: AtomicU64,
}

impl SweepProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parts_total(&self, total: usize) {
        self.inner.parts_total.store(total, Ordering::Relaxed);
    }

    pub fn begin_part(&self) {
        self.inner.part_rows.store(0, Ordering::Relaxed);
    }

    pub fn finish_part(&self) {
        self.inner.parts_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_row(&self) {
        self.inner.part_rows.fetch_add(1, Ordering::Relaxed);
        self.inner.rows_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group(&self) {
        self.inner.groups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group_failure(&self) {
        self.inner.groups.fetch_add(1, Ordering::Relaxed);
        self.inner.groups_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deleted(&self, keys: u64) {
        self.inner.deleted_keys.fetch_add(keys, Ordering::Relaxed);
    }

    pub fn parts_done(&self) -> usize {
        self.inner.parts_done.load(Ordering::Relaxed)
    }

    pub fn rows_total(&self) -> u64 {
        self.inner.rows_total.load(Ordering::Relaxed)
    }

    pub fn deleted_keys(&self) -> u64 {
        self.inner.deleted_keys.load(Ordering::Relaxed)
    }

    /// One status line from the current counters.
    pub fn log_status(&self) {
        let parts_total = self.inner.parts_total.load(Ordering::Relaxed);
        let parts_done = self.inner.parts_done.load(Ordering::Relaxed);
        let current = (parts_done + 1).min(parts_total.max(1));

        log::info!(
            "Processing part {}/{}: {} rows in part, {} groups reconciled, {} keys deleted",
            current,
            parts_total,
            self.inner.part_rows.load(Ordering::Relaxed),
            self.inner.groups.load(Ordering::Relaxed),
            self.inner.deleted_keys.load(Ordering::Relaxed),
        );
    }

    /// Final counts for the operator.
    pub fn summary(&self, dry_run: bool) -> RunSummary {
        RunSummary {
            parts: self.inner.parts_done.load(Ordering::Relaxed),
            rows: self.inner.rows_total.load(Ordering::Relaxed),
            groups: self.inner.groups.load(Ordering::Relaxed),
            groups_failed: self.inner.groups_failed.load(Ordering::Relaxed),
            deleted_keys: self.inner.deleted_keys.load(Ordering::Relaxed),
            dry_run,
        }
    }
}

/// Final counts of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub parts: usize,
    pub rows: u64,
    pub groups: u64,
    pub groups_failed: u64,
    /// Keys deleted, or in dry-run mode the keys that would have been.
    pub deleted_keys: u64,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn log(&self) {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        log::info!(
            "Sweep complete{mode}: {} parts, {} rows, {} groups ({} failed), {} keys deleted",
            self.parts,
            self.rows,
            self.groups,
            self.groups_failed,
            self.deleted_keys,
        );
    }
}

/// Spawn the periodic reporter task. Observational only; the runner aborts
/// the handle once the run finishes.
pub fn spawn_reporter(progress: SweepProgress, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so reports start one
        // interval into the run.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            progress.log_status();
        }
    })
}
