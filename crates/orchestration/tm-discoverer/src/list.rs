//! S3 object and common-prefix listing with pagination support.

use async_stream::try_stream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use futures::Stream;
use tm_error::{Result, TmError};

/// An S3 object observed during listing.
#[derive(Debug, Clone)]
pub struct S3Object {
    /// The object key (full path within the bucket)
    pub key: String,

    /// Size of the object in bytes
    pub size: u64,

    /// Last modified timestamp
    pub last_modified: Option<DateTime<Utc>>,
}

/// List objects under a prefix as a stream, handling pagination.
///
/// `start_after` maps to S3 `StartAfter`: only keys strictly greater in
/// lexicographic order are returned, which is what makes checkpointed
/// resumption work. Directory markers are filtered out.
pub fn list_objects(
    client: Client,
    bucket: String,
    prefix: String,
    start_after: Option<String>,
    max_keys: i32,
) -> impl Stream<Item = Result<S3Object>> {
    try_stream! {
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = client
                .list_objects_v2()
                .bucket(&bucket)
                .prefix(&prefix)
                .max_keys(max_keys);

            if let Some(ref start) = start_after {
                req = req.start_after(start);
            }

            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| TmError::S3(format!("list objects failed: {e}")))?;

            if let Some(contents) = resp.contents {
                for obj in contents {
                    let key = obj.key.unwrap_or_default();

                    if key.is_empty() || key.ends_with('/') {
                        continue;
                    }

                    let last_modified = obj.last_modified.and_then(|t| {
                        DateTime::from_timestamp(t.secs(), t.subsec_nanos())
                    });

                    yield S3Object {
                        key,
                        size: obj.size.unwrap_or(0) as u64,
                        last_modified,
                    };
                }
            }

            if resp.is_truncated == Some(true) {
                continuation_token = resp.next_continuation_token;
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
    }
}

/// List the common prefixes directly under `prefix` using delimiter `/`.
///
/// Single page only; `max_keys` caps the response size.
pub async fn list_common_prefixes(
    client: &Client,
    bucket: &str,
    prefix: &str,
    max_keys: i32,
) -> Result<Vec<String>> {
    let resp = client
        .list_objects_v2()
        .bucket(bucket)
        .prefix(prefix)
        .delimiter("/")
        .max_keys(max_keys)
        .send()
        .await
        .map_err(|e| TmError::S3(format!("list common prefixes failed: {e}")))?;

    Ok(resp
        .common_prefixes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|cp| cp.prefix)
        .collect())
}

/// List all common prefixes under `prefix`, following continuation tokens.
pub async fn list_all_common_prefixes(
    client: &Client,
    bucket: &str,
    prefix: &str,
    max_keys: i32,
) -> Result<Vec<String>> {
    let mut prefixes = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let mut req = client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .delimiter("/")
            .max_keys(max_keys);

        if let Some(ref token) = continuation_token {
            req = req.continuation_token(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TmError::S3(format!("list common prefixes failed: {e}")))?;

        if let Some(common_prefixes) = resp.common_prefixes {
            for cp in common_prefixes {
                if let Some(p) = cp.prefix {
                    prefixes.push(p);
                }
            }
        }

        if resp.is_truncated == Some(true) {
            continuation_token = resp.next_continuation_token;
            if continuation_token.is_none() {
                break;
            }
        } else {
            break;
        }
    }

    Ok(prefixes)
}
