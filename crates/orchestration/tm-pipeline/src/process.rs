//! Processor pool: dedup, routing extraction, write.
//!
//! Records that fail to parse, carry no usable timestamp, or name no account
//! are data-quality events, not errors: they are skipped silently and do not
//! touch the error counter.
//!
//! The filter check and the later add are deliberately not atomic: two
//! workers can both see "absent" and write the same event once each. The
//! filter reduces duplication, it does not guarantee uniqueness; CloudTrail
//! itself occasionally delivers duplicates, so consumers must already be
//! idempotent on `eventID`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::value::RawValue;
use tm_bloom::PersistentFilter;
use tm_types::{MinimalEvent, ProcessedFile};
use tokio::sync::mpsc;
use tracing::error;

use crate::sink::JsonlSink;
use crate::stats::PipelineStats;

/// One processor worker: drains decoded files until the downloaders are done
/// and the queue closes.
pub(crate) async fn process_worker(
    mut files: mpsc::Receiver<ProcessedFile>,
    sink: Arc<JsonlSink>,
    filter: Arc<PersistentFilter>,
    stats: Arc<PipelineStats>,
) {
    while let Some(file) = files.recv().await {
        for raw in file.records {
            process_record(raw, &sink, &filter, &stats);
        }
        stats.record_file_processed();
    }
}

/// Route a single raw record: parse the minimal fields, drop duplicates,
/// write, then mark the filter.
///
/// The filter is marked only after a successful write, so a failed write
/// leaves the event eligible for re-emission on a later run.
pub(crate) fn process_record(
    raw: Box<RawValue>,
    sink: &JsonlSink,
    filter: &PersistentFilter,
    stats: &PipelineStats,
) {
    stats.record_event();

    let minimal: MinimalEvent = match serde_json::from_str(raw.get()) {
        Ok(minimal) => minimal,
        Err(_) => return,
    };

    if filter.contains(minimal.event_id.as_bytes()) {
        stats.record_duplicate();
        return;
    }

    let event_time = match DateTime::parse_from_rfc3339(&minimal.event_time) {
        Ok(time) => time.with_timezone(&Utc),
        Err(_) => return,
    };

    let Some(account_id) = minimal.resolved_account_id() else {
        return;
    };
    let account_id = account_id.to_string();

    if let Err(e) = sink.write(&account_id, &minimal.aws_region, event_time, raw) {
        error!(
            account = %account_id,
            region = %minimal.aws_region,
            error = %e,
            "failed to write event"
        );
        return;
    }

    filter.add(minimal.event_id.as_bytes());
    stats.record_written();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        sink: JsonlSink,
        filter: PersistentFilter,
        stats: PipelineStats,
        events_path: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(dir.path().join("events"), 100);
        let filter = PersistentFilter::load(dir.path().join("bloom.dat"), 1000, 0.01);
        let events_path = dir.path().join("events");
        Fixture {
            _dir: dir,
            sink,
            filter,
            stats: PipelineStats::new(),
            events_path,
        }
    }

    fn record(event_id: &str, account: &str) -> Box<RawValue> {
        RawValue::from_string(format!(
            r#"{{"eventID":"{event_id}","eventTime":"2024-03-15T12:34:56Z","awsRegion":"us-east-1","recipientAccountId":"{account}"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_record_is_written_and_marked() {
        let f = fixture();

        process_record(record("ev-a", "123456789012"), &f.sink, &f.filter, &f.stats);

        let snapshot = f.stats.snapshot();
        assert_eq!(snapshot.events_processed, 1);
        assert_eq!(snapshot.events_written, 1);
        assert_eq!(snapshot.events_duplicate, 0);
        assert!(f.filter.contains(b"ev-a"));

        f.sink.flush_all();
        let out = std::fs::read_to_string(
            f.events_path
                .join("123456789012/us-east-1/2024/03/15/12/events_00000.jsonl"),
        )
        .unwrap();
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_duplicate_is_counted_not_written() {
        let f = fixture();

        process_record(record("ev-a", "123456789012"), &f.sink, &f.filter, &f.stats);
        process_record(record("ev-a", "123456789012"), &f.sink, &f.filter, &f.stats);

        let snapshot = f.stats.snapshot();
        assert_eq!(snapshot.events_processed, 2);
        assert_eq!(snapshot.events_written, 1);
        assert_eq!(snapshot.events_duplicate, 1);
    }

    #[test]
    fn test_account_falls_back_to_user_identity() {
        let f = fixture();

        let raw = RawValue::from_string(
            r#"{"eventID":"ev-b","eventTime":"2024-03-15T12:34:56Z","awsRegion":"us-east-1","userIdentity":{"accountId":"999999999999"}}"#.to_string(),
        )
        .unwrap();
        process_record(raw, &f.sink, &f.filter, &f.stats);

        f.sink.flush_all();
        assert!(f
            .events_path
            .join("999999999999/us-east-1/2024/03/15/12/events_00000.jsonl")
            .exists());
    }

    #[test]
    fn test_unparseable_record_is_silently_skipped() {
        let f = fixture();

        let raw = RawValue::from_string(r#""just a string""#.to_string()).unwrap();
        process_record(raw, &f.sink, &f.filter, &f.stats);

        let snapshot = f.stats.snapshot();
        assert_eq!(snapshot.events_processed, 1);
        assert_eq!(snapshot.events_written, 0);
        assert_eq!(snapshot.errors, 0);
    }

    #[test]
    fn test_bad_timestamp_is_skipped_without_marking_filter() {
        let f = fixture();

        let raw = RawValue::from_string(
            r#"{"eventID":"ev-c","eventTime":"yesterday","awsRegion":"us-east-1","recipientAccountId":"123456789012"}"#.to_string(),
        )
        .unwrap();
        process_record(raw, &f.sink, &f.filter, &f.stats);

        assert_eq!(f.stats.snapshot().events_written, 0);
        assert!(!f.filter.contains(b"ev-c"));
    }

    #[test]
    fn test_missing_account_is_skipped() {
        let f = fixture();

        let raw = RawValue::from_string(
            r#"{"eventID":"ev-d","eventTime":"2024-03-15T12:34:56Z","awsRegion":"us-east-1"}"#
                .to_string(),
        )
        .unwrap();
        process_record(raw, &f.sink, &f.filter, &f.stats);

        assert_eq!(f.stats.snapshot().events_written, 0);
        assert_eq!(f.sink.buffer_count(), 0);
    }

    #[test]
    fn test_empty_event_id_dedupes_after_first_write() {
        let f = fixture();

        let no_id = r#"{"eventTime":"2024-03-15T12:34:56Z","awsRegion":"us-east-1","recipientAccountId":"123456789012"}"#;
        process_record(RawValue::from_string(no_id.to_string()).unwrap(), &f.sink, &f.filter, &f.stats);
        process_record(RawValue::from_string(no_id.to_string()).unwrap(), &f.sink, &f.filter, &f.stats);

        let snapshot = f.stats.snapshot();
        assert_eq!(snapshot.events_written, 1);
        assert_eq!(snapshot.events_duplicate, 1);
        assert!(f.filter.contains(b""));
    }

    #[test]
    fn test_offset_timestamp_partitions_in_utc() {
        let f = fixture();

        let raw = RawValue::from_string(
            r#"{"eventID":"ev-e","eventTime":"2024-03-15T23:30:00-02:00","awsRegion":"us-east-1","recipientAccountId":"123456789012"}"#.to_string(),
        )
        .unwrap();
        process_record(raw, &f.sink, &f.filter, &f.stats);
        f.sink.flush_all();

        // 23:30-02:00 is 01:30 UTC the next day
        assert!(f
            .events_path
            .join("123456789012/us-east-1/2024/03/16/01/events_00000.jsonl")
            .exists());
    }
}
