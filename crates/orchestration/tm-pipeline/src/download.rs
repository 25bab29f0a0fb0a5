//! Downloader pool: fetch, decompress, decode.
//!
//! CloudTrail log objects are small (typically well under 10 MB) and gzip
//! framing requires a sequential read, so each object is buffered fully
//! before decoding; streaming into the JSON decoder would save nothing.

use std::io::Read;
use std::sync::Arc;

use aws_sdk_s3::Client;
use flate2::read::GzDecoder;
use serde_json::value::RawValue;
use tm_error::{Result, TmError};
use tm_types::{DownloadJob, LogFile, ProcessedFile};
use tokio::sync::mpsc;
use tracing::error;

use crate::queue::WorkQueue;
use crate::shutdown::ShutdownFlag;
use crate::stats::PipelineStats;

/// Decompress and decode one log object payload into its raw records.
pub fn decode_log_file(data: &[u8]) -> Result<Vec<Box<RawValue>>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| TmError::Decode(format!("gzip: {e}")))?;

    let log: LogFile = serde_json::from_slice(&decompressed)
        .map_err(|e| TmError::Decode(format!("json: {e}")))?;

    Ok(log.records)
}

/// One downloader worker: drains its job channel until the listers are done
/// and the queue closes. Failed objects are logged, counted, and dropped;
/// the pipeline keeps going. After shutdown is signaled, remaining queued
/// jobs are discarded without fetching.
pub(crate) async fn download_worker(
    client: Client,
    mut jobs: mpsc::Receiver<DownloadJob>,
    output: Arc<WorkQueue<ProcessedFile>>,
    stats: Arc<PipelineStats>,
    shutdown: ShutdownFlag,
) {
    while let Some(job) = jobs.recv().await {
        if shutdown.is_triggered() {
            continue;
        }

        let resp = match client
            .get_object()
            .bucket(&job.bucket)
            .key(&job.key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                stats.record_error();
                error!(
                    bucket = %job.bucket,
                    key = %job.key,
                    error = %e,
                    "failed to download object"
                );
                continue;
            }
        };

        let body = match resp.body.collect().await {
            Ok(body) => body.into_bytes(),
            Err(e) => {
                stats.record_error();
                error!(
                    bucket = %job.bucket,
                    key = %job.key,
                    error = %e,
                    "failed to read object body"
                );
                continue;
            }
        };

        stats.record_downloaded(body.len() as u64);

        let records = match decode_log_file(&body) {
            Ok(records) => records,
            Err(e) => {
                stats.record_error();
                error!(
                    bucket = %job.bucket,
                    key = %job.key,
                    error = %e,
                    "failed to decode object"
                );
                continue;
            }
        };

        if output.send(ProcessedFile { job, records }).await.is_err() {
            break;
        }
    }
}
