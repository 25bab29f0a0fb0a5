//! Checkpointed per-(account, region) S3 enumeration.
//!
//! Each lister resumes from the persisted high-water mark with `StartAfter`,
//! enqueues `.json.gz` objects as download jobs, and advances the checkpoint
//! every [`CHECKPOINT_EVERY`] enqueued keys plus once after pagination ends.
//! CloudTrail keys embed timestamps in-path, so lexicographically greater
//! means newer than anything already enqueued.

use std::sync::Arc;

use aws_sdk_s3::Client;
use futures::{pin_mut, StreamExt};
use tm_discoverer::list_objects;
use tm_state::StateStore;
use tm_types::{AccountRegionPair, DownloadJob};
use tracing::{error, info};

use crate::queue::WorkQueue;
use crate::shutdown::ShutdownFlag;
use crate::stats::PipelineStats;

const CHECKPOINT_EVERY: u64 = 100;

/// Build the object prefix for one work unit.
pub(crate) fn search_prefix(
    base_prefix: &str,
    org_id: Option<&str>,
    account: &str,
    region: &str,
) -> String {
    match org_id {
        Some(org) => format!("{base_prefix}{org}/{account}/CloudTrail/{region}/"),
        None => format!("{base_prefix}{account}/CloudTrail/{region}/"),
    }
}

/// One listing task for a `(bucket, account, region)` triple.
pub struct Lister {
    pub client: Client,
    pub state: Arc<StateStore>,
    pub stats: Arc<PipelineStats>,
    pub queue: Arc<WorkQueue<DownloadJob>>,
    pub shutdown: ShutdownFlag,
    pub bucket: String,
    pub base_prefix: String,
    pub org_id: Option<String>,
    pub pair: AccountRegionPair,
    pub list_batch_size: i32,
}

impl Lister {
    /// Enumerate the triple, pushing download jobs until the prefix is
    /// exhausted, the queue closes, shutdown is signaled, or listing fails.
    pub async fn run(self) {
        let account = &self.pair.account_id;
        let region = &self.pair.region;

        let last = match self.state.last_key(&self.bucket, account, region) {
            Ok(key) => key,
            Err(e) => {
                error!(
                    bucket = %self.bucket,
                    account = %account,
                    region = %region,
                    error = %e,
                    "failed to read checkpoint"
                );
                String::new()
            }
        };
        if !last.is_empty() {
            info!(
                bucket = %self.bucket,
                account = %account,
                region = %region,
                last_key = %last,
                "resuming from checkpoint"
            );
        }

        let prefix = search_prefix(&self.base_prefix, self.org_id.as_deref(), account, region);
        let start_after = (!last.is_empty()).then_some(last);

        let stream = list_objects(
            self.client.clone(),
            self.bucket.clone(),
            prefix,
            start_after,
            self.list_batch_size,
        );
        pin_mut!(stream);

        let mut enqueued = 0u64;
        let mut last_seen = String::new();

        while let Some(item) = stream.next().await {
            if self.shutdown.is_triggered() {
                break;
            }

            let obj = match item {
                Ok(obj) => obj,
                Err(e) => {
                    self.stats.record_error();
                    error!(
                        bucket = %self.bucket,
                        account = %account,
                        region = %region,
                        error = %e,
                        "failed to list objects"
                    );
                    break;
                }
            };

            if !obj.key.ends_with(".json.gz") {
                continue;
            }

            self.stats.record_listed();
            enqueued += 1;
            last_seen = obj.key.clone();

            let job = DownloadJob {
                bucket: self.bucket.clone(),
                key: obj.key,
                size: obj.size,
                last_modified: obj.last_modified,
            };
            if self.queue.send(job).await.is_err() {
                break;
            }

            if enqueued % CHECKPOINT_EVERY == 0 {
                self.checkpoint(&last_seen);
            }
        }

        // The final checkpoint covers triples with fewer than
        // CHECKPOINT_EVERY files, and the tail of every run.
        if enqueued > 0 {
            self.checkpoint(&last_seen);
            info!(
                bucket = %self.bucket,
                account = %account,
                region = %region,
                count = enqueued,
                "enqueued files"
            );
        }
    }

    fn checkpoint(&self, key: &str) {
        if let Err(e) = self.state.upsert_last_key(
            &self.bucket,
            &self.pair.account_id,
            &self.pair.region,
            key,
        ) {
            self.stats.record_error();
            error!(
                bucket = %self.bucket,
                account = %self.pair.account_id,
                region = %self.pair.region,
                error = %e,
                "failed to update checkpoint"
            );
        }
    }
}
