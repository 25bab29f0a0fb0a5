//! Run statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::info;

/// Lock-free counters shared by every pipeline task.
pub struct PipelineStats {
    started: Instant,
    files_listed: AtomicU64,
    files_downloaded: AtomicU64,
    files_processed: AtomicU64,
    events_processed: AtomicU64,
    events_written: AtomicU64,
    events_duplicate: AtomicU64,
    bytes_downloaded: AtomicU64,
    jsonl_files: AtomicU64,
    errors: AtomicU64,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            files_listed: AtomicU64::new(0),
            files_downloaded: AtomicU64::new(0),
            files_processed: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            events_written: AtomicU64::new(0),
            events_duplicate: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            jsonl_files: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn record_listed(&self) {
        self.files_listed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_downloaded(&self, bytes: u64) {
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_file_processed(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self) {
        self.events_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.events_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_jsonl_files(&self, count: u64) {
        self.jsonl_files.store(count, Ordering::Relaxed);
    }

    pub fn files_listed(&self) -> u64 {
        self.files_listed.load(Ordering::Relaxed)
    }

    pub fn files_downloaded(&self) -> u64 {
        self.files_downloaded.load(Ordering::Relaxed)
    }

    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Emit the periodic progress record with derived rates.
    pub fn log_progress(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }

        let snapshot = self.snapshot();
        let download_rate = snapshot.files_downloaded as f64 / elapsed;
        let event_rate = snapshot.events_processed as f64 / elapsed;
        let mb_per_sec = snapshot.bytes_downloaded as f64 / elapsed / 1024.0 / 1024.0;

        info!(
            elapsed_secs = elapsed as u64,
            files_listed = snapshot.files_listed,
            files_downloaded = snapshot.files_downloaded,
            download_rate,
            mb_per_sec,
            files_processed = snapshot.files_processed,
            events_processed = snapshot.events_processed,
            event_rate,
            events_written = snapshot.events_written,
            events_duplicate = snapshot.events_duplicate,
            jsonl_files = snapshot.jsonl_files,
            errors = snapshot.errors,
            "progress"
        );
    }

    /// Capture the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            files_listed: self.files_listed.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_written: self.events_written.load(Ordering::Relaxed),
            events_duplicate: self.events_duplicate.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            jsonl_files: self.jsonl_files.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub elapsed_secs: f64,
    pub files_listed: u64,
    pub files_downloaded: u64,
    pub files_processed: u64,
    pub events_processed: u64,
    pub events_written: u64,
    pub events_duplicate: u64,
    pub bytes_downloaded: u64,
    pub jsonl_files: u64,
    pub errors: u64,
}
