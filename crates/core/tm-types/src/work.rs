//! Work-unit types handed between pipeline stages.

use chrono::{DateTime, Utc};
use serde_json::value::RawValue;

/// One `(account, region)` work unit discovered within a trail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountRegionPair {
    /// 12-digit AWS account ID.
    pub account_id: String,

    /// Region token, e.g. `us-east-1`.
    pub region: String,
}

/// An S3 object to download and process.
///
/// Immutable handoff from a lister to the downloader pool. Keys always end
/// in `.json.gz`.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Decoded records from one log object, handed to the processor pool.
#[derive(Debug)]
pub struct ProcessedFile {
    pub job: DownloadJob,
    pub records: Vec<Box<RawValue>>,
}
