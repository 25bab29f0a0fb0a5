//! Configuration document for trailmirror.
//!
//! The config is a JSON object; unknown keys are ignored and missing keys
//! fall back to the defaults below, so a partial document is always valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tm_error::{Result, TmError};

/// A CloudTrail delivery declaration: where to look for log objects.
///
/// Multiple trails may share a bucket; their work units are merged naturally
/// through the shared checkpoint store and dedup filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trail {
    pub name: String,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Processing settings
    pub download_workers: usize,
    /// Processor pool size; `0` auto-sizes to 2x logical CPUs.
    pub process_workers: usize,
    pub download_queue_size: usize,
    pub process_queue_size: usize,
    /// S3 `MaxKeys` for the listing paginator.
    pub list_batch_size: i32,
    /// Flush threshold per partition buffer.
    pub events_per_file: usize,

    // Paths
    pub state_db: PathBuf,
    pub bloom_file: PathBuf,
    pub events_dir: PathBuf,

    // Dedup filter sizing
    pub bloom_expected_items: u64,
    pub bloom_false_positive: f64,

    // Ticker periods, in seconds
    pub state_save_interval: u64,
    pub progress_interval: u64,
    pub jsonl_flush_interval: u64,

    // HTTP client tuning, in seconds. The pool-shape settings are accepted
    // for compatibility with existing config files; the SDK connector
    // manages its own pool, and only the two timeouts are applied.
    pub max_idle_conns: u32,
    pub max_idle_conns_per_host: u32,
    pub max_conns_per_host: u32,
    pub idle_conn_timeout: u64,
    pub dial_timeout: u64,
    pub keep_alive: u64,
    pub client_timeout: u64,

    /// Trails to process; when empty, trails are discovered via the
    /// CloudTrail API.
    pub trails: Vec<Trail>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_workers: 50,
            process_workers: 0,
            download_queue_size: 5000,
            process_queue_size: 2000,
            list_batch_size: 1000,
            events_per_file: 10_000,
            state_db: PathBuf::from("state.db"),
            bloom_file: PathBuf::from("bloom.dat"),
            events_dir: PathBuf::from("events"),
            bloom_expected_items: 100_000_000,
            bloom_false_positive: 0.001,
            state_save_interval: 300,
            progress_interval: 10,
            jsonl_flush_interval: 30,
            max_idle_conns: 500,
            max_idle_conns_per_host: 500,
            max_conns_per_host: 500,
            idle_conn_timeout: 90,
            dial_timeout: 10,
            keep_alive: 30,
            client_timeout: 60,
            trails: Vec::new(),
        }
    }
}

impl Config {
    /// Load a config document, layering it over the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|e| TmError::Config(format!("read config file: {e}")))?;
        serde_json::from_str(&data).map_err(|e| TmError::Config(format!("parse config: {e}")))
    }

    /// Write the config document as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| TmError::Config(format!("marshal config: {e}")))?;
        fs::write(path.as_ref(), data)
            .map_err(|e| TmError::Config(format!("write config file: {e}")))?;
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.download_workers == 0 {
            return Err("download_workers must be at least 1".to_string());
        }
        if self.download_queue_size == 0 || self.process_queue_size == 0 {
            return Err("queue sizes must be at least 1".to_string());
        }
        if !(1..=1000).contains(&self.list_batch_size) {
            return Err("list_batch_size must be in 1..=1000".to_string());
        }
        if self.events_per_file == 0 {
            return Err("events_per_file must be at least 1".to_string());
        }
        if self.state_save_interval == 0
            || self.progress_interval == 0
            || self.jsonl_flush_interval == 0
        {
            return Err("ticker intervals must be at least 1 second".to_string());
        }
        if self.bloom_expected_items == 0 {
            return Err("bloom_expected_items must be at least 1".to_string());
        }
        if !(self.bloom_false_positive > 0.0 && self.bloom_false_positive < 1.0) {
            return Err("bloom_false_positive must be in (0, 1)".to_string());
        }
        Ok(())
    }
}
