use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use log::{info, trace};

/// Tracks row-level store activity for the per-stage summary log lines
#[derive(Debug)]
pub struct StorageMetrics {
    appended_rows: AtomicU64,
    append_batches: AtomicU64,
    streamed_rows: AtomicU64,
    deleted_rows: AtomicU64,
    retries: AtomicU64,
    failed_ops: AtomicU64,
    start_time: Instant,
}

impl StorageMetrics {
    pub fn new() -> Self {
        Self {
            appended_rows: AtomicU64::new(0),
            append_batches: AtomicU64::new(0),
            streamed_rows: AtomicU64::new(0),
            deleted_rows: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failed_ops: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_append(&self, rows: usize) {
        self.appended_rows.fetch_add(rows as u64, Ordering::Relaxed);
        self.append_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_streamed(&self, rows: usize) {
        self.streamed_rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_deleted(&self, rows: usize) {
        self.deleted_rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed_ops(&self) {
        self.failed_ops.fetch_add(1, Ordering::Relaxed);
        trace!("Failed operation recorded. Total failures: {}", self.failed_ops.load(Ordering::Relaxed));
    }

    pub fn get_stats(&self) -> StorageMetricsStats {
        StorageMetricsStats {
            appended_rows: self.appended_rows.load(Ordering::Relaxed),
            append_batches: self.append_batches.load(Ordering::Relaxed),
            streamed_rows: self.streamed_rows.load(Ordering::Relaxed),
            deleted_rows: self.deleted_rows.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failed_operations: self.failed_ops.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Logs the counters accumulated so far under a stage name.
    pub fn log_summary(&self, stage: &str) {
        let stats = self.get_stats();
        info!(
            "[{}] store: {} rows appended in {} batches, {} streamed, {} deleted, {} retries, {} failures",
            stage,
            stats.appended_rows,
            stats.append_batches,
            stats.streamed_rows,
            stats.deleted_rows,
            stats.retries,
            stats.failed_operations
        );
    }

    pub fn reset(&self) {
        self.appended_rows.store(0, Ordering::Relaxed);
        self.append_batches.store(0, Ordering::Relaxed);
        self.streamed_rows.store(0, Ordering::Relaxed);
        self.deleted_rows.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.failed_ops.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct StorageMetricsStats {
    pub appended_rows: u64,
    pub append_batches: u64,
    pub streamed_rows: u64,
    pub deleted_rows: u64,
    pub retries: u64,
    pub failed_operations: u64,
    pub uptime_seconds: u64,
}

impl StorageMetricsStats {
    pub fn rows_per_second(&self) -> f64 {
        if self.uptime_seconds == 0 {
            return 0.0;
        }
        (self.appended_rows + self.streamed_rows) as f64 / self.uptime_seconds as f64
    }

    pub fn failure_rate(&self) -> f64 {
        let total_ops = self.append_batches + self.retries;
        if total_ops == 0 {
            return 0.0;
        }
        self.failed_operations as f64 / total_ops as f64
    }
}

impl Default for StorageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let metrics = StorageMetrics::new();
        metrics.record_append(10);
        metrics.record_append(5);
        metrics.record_streamed(7);
        metrics.record_deleted(2);
        metrics.increment_retries();

        let stats = metrics.get_stats();
        assert_eq!(stats.appended_rows, 15);
        assert_eq!(stats.append_batches, 2);
        assert_eq!(stats.streamed_rows, 7);
        assert_eq!(stats.deleted_rows, 2);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.failure_rate(), 0.0);

        metrics.reset();
        assert_eq!(metrics.get_stats().appended_rows, 0);
    }
}
