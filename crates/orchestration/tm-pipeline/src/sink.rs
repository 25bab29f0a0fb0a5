//! Time-partitioned JSONL output.
//!
//! Records buffer in memory per partition key and flush to numbered files:
//!
//! ```text
//! {events_dir}/{account}/{region}/YYYY/MM/DD/HH/events_{NNNNN}.jsonl
//! ```
//!
//! Files are created once and never appended to; a later flush for the same
//! partition gets the next counter value. Records are written verbatim, one
//! per line, newline after every record including the last.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::value::RawValue;
use tm_error::Result;
use tracing::{debug, error};

/// Derive the partition key for an event: `{account}/{region}/YYYY/MM/DD/HH`
/// in UTC.
pub fn partition_key(account: &str, region: &str, event_time: DateTime<Utc>) -> String {
    format!("{}/{}/{}", account, region, event_time.format("%Y/%m/%d/%H"))
}

#[derive(Default)]
struct SinkInner {
    buffers: HashMap<String, Vec<Box<RawValue>>>,
    next_file: HashMap<String, u32>,
}

/// Buffered, partition-keyed JSONL writer.
///
/// One lock guards the buffer map and counters; the two worker pools around
/// the sink dominate the cost, not this lock.
pub struct JsonlSink {
    events_dir: PathBuf,
    events_per_file: usize,
    files_written: AtomicU64,
    inner: Mutex<SinkInner>,
}

impl JsonlSink {
    pub fn new(events_dir: impl Into<PathBuf>, events_per_file: usize) -> Self {
        Self {
            events_dir: events_dir.into(),
            events_per_file: events_per_file.max(1),
            files_written: AtomicU64::new(0),
            inner: Mutex::new(SinkInner::default()),
        }
    }

    /// Append a record to its partition buffer, flushing inline when the
    /// buffer reaches the per-file threshold.
    pub fn write(
        &self,
        account: &str,
        region: &str,
        event_time: DateTime<Utc>,
        raw: Box<RawValue>,
    ) -> Result<()> {
        let key = partition_key(account, region, event_time);

        let mut inner = self.inner.lock();
        let buffer = inner
            .buffers
            .entry(key.clone())
            .or_insert_with(|| Vec::with_capacity(self.events_per_file));
        buffer.push(raw);

        if buffer.len() >= self.events_per_file {
            self.flush_partition(&mut inner, &key)?;
        }

        Ok(())
    }

    /// Flush every non-empty buffer. Per-partition failures are logged and
    /// do not stop the remaining partitions.
    pub fn flush_all(&self) {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner.buffers.keys().cloned().collect();

        for key in keys {
            if let Err(e) = self.flush_partition(&mut inner, &key) {
                error!(partition = %key, error = %e, "failed to flush events buffer");
            }
        }
    }

    /// Number of live partition buffers.
    pub fn buffer_count(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    /// Total JSONL files written so far.
    pub fn files_written(&self) -> u64 {
        self.files_written.load(Ordering::Relaxed)
    }

    fn flush_partition(&self, inner: &mut SinkInner, key: &str) -> Result<()> {
        let Some(buffer) = inner.buffers.get_mut(key) else {
            return Ok(());
        };
        if buffer.is_empty() {
            return Ok(());
        }

        let counter = inner.next_file.entry(key.to_string()).or_insert(0);
        let file_number = *counter;
        *counter += 1;

        let path = self
            .events_dir
            .join(key)
            .join(format!("events_{file_number:05}.jsonl"));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = fs::File::create(&path)?;
        let mut writer = BufWriter::new(file);
        for raw in buffer.iter() {
            writer.write_all(raw.get().as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        debug!(
            partition = %key,
            events = buffer.len(),
            file = %path.display(),
            "flushed events buffer"
        );

        buffer.clear();
        self.files_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).unwrap()
    }

    fn event_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 34, 56).unwrap()
    }

    #[test]
    fn test_partition_key() {
        assert_eq!(
            partition_key("123456789012", "us-east-1", event_time()),
            "123456789012/us-east-1/2024/03/15/12"
        );
    }

    #[test]
    fn test_flush_all_writes_partitioned_file() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path(), 100);

        sink.write("123456789012", "us-east-1", event_time(), raw(r#"{"eventID":"a"}"#))
            .unwrap();
        sink.write("123456789012", "us-east-1", event_time(), raw(r#"{"eventID":"b"}"#))
            .unwrap();
        assert_eq!(sink.buffer_count(), 1);

        sink.flush_all();

        let path = dir
            .path()
            .join("123456789012/us-east-1/2024/03/15/12/events_00000.jsonl");
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents, "{\"eventID\":\"a\"}\n{\"eventID\":\"b\"}\n");
        assert_eq!(sink.files_written(), 1);
    }

    #[test]
    fn test_records_are_verbatim() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path(), 100);

        let original = r#"{"eventID":"a","deep":{"keys":[1,2,{"x":null}]},"s":"é"}"#;
        sink.write("123456789012", "us-east-1", event_time(), raw(original))
            .unwrap();
        sink.flush_all();

        let path = dir
            .path()
            .join("123456789012/us-east-1/2024/03/15/12/events_00000.jsonl");
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.trim_end_matches('\n'), original);
    }

    #[test]
    fn test_inline_flush_at_threshold() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path(), 3);

        for i in 0..7 {
            sink.write(
                "123456789012",
                "us-east-1",
                event_time(),
                raw(&format!(r#"{{"eventID":"{i}"}}"#)),
            )
            .unwrap();
        }
        sink.flush_all();

        let base = dir.path().join("123456789012/us-east-1/2024/03/15/12");
        let first = fs::read_to_string(base.join("events_00000.jsonl")).unwrap();
        let second = fs::read_to_string(base.join("events_00001.jsonl")).unwrap();
        let third = fs::read_to_string(base.join("events_00002.jsonl")).unwrap();

        assert_eq!(first.lines().count(), 3);
        assert_eq!(second.lines().count(), 3);
        assert_eq!(third.lines().count(), 1);
        assert_eq!(sink.files_written(), 3);
    }

    #[test]
    fn test_partitions_are_isolated() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path(), 100);

        sink.write("111111111111", "us-east-1", event_time(), raw(r#"{"eventID":"a"}"#))
            .unwrap();
        sink.write("222222222222", "eu-west-1", event_time(), raw(r#"{"eventID":"b"}"#))
            .unwrap();
        assert_eq!(sink.buffer_count(), 2);

        sink.flush_all();

        assert!(dir
            .path()
            .join("111111111111/us-east-1/2024/03/15/12/events_00000.jsonl")
            .exists());
        assert!(dir
            .path()
            .join("222222222222/eu-west-1/2024/03/15/12/events_00000.jsonl")
            .exists());
    }

    #[test]
    fn test_flush_all_is_idempotent_on_empty_buffers() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path(), 100);

        sink.write("123456789012", "us-east-1", event_time(), raw(r#"{"eventID":"a"}"#))
            .unwrap();
        sink.flush_all();
        sink.flush_all();

        let base = dir.path().join("123456789012/us-east-1/2024/03/15/12");
        assert!(base.join("events_00000.jsonl").exists());
        assert!(!base.join("events_00001.jsonl").exists());
        assert_eq!(sink.files_written(), 1);
    }

    #[test]
    fn test_counter_continues_after_flush_all() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path(), 100);

        sink.write("123456789012", "us-east-1", event_time(), raw(r#"{"eventID":"a"}"#))
            .unwrap();
        sink.flush_all();
        sink.write("123456789012", "us-east-1", event_time(), raw(r#"{"eventID":"b"}"#))
            .unwrap();
        sink.flush_all();

        let base = dir.path().join("123456789012/us-east-1/2024/03/15/12");
        assert!(base.join("events_00000.jsonl").exists());
        assert!(base.join("events_00001.jsonl").exists());
    }
}
