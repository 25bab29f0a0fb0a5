//! CloudTrail bucket layout discovery.
//!
//! CloudTrail delivers logs under one of two shapes:
//!
//! - flat:       `{prefix}AWSLogs/{account}/CloudTrail/{region}/...`
//! - org-rooted: `{prefix}AWSLogs/{org_id}/{account}/CloudTrail/{region}/...`
//!
//! Discovery probes the hierarchy level by level with delimiter listings and
//! emits only the `(account, region)` pairs that actually contain data.

use std::collections::BTreeSet;

use aws_sdk_s3::Client;
use tm_error::Result;
use tm_types::AccountRegionPair;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::list::{list_all_common_prefixes, list_common_prefixes};

/// Accounts found under a trail's `AWSLogs/` level, plus the organization ID
/// when the bucket is org-rooted.
#[derive(Debug, Clone)]
pub struct AccountDiscovery {
    pub accounts: Vec<String>,
    pub org_id: Option<String>,
}

/// Build the listing root for a trail: `AWSLogs/`, under the trail prefix
/// when one is configured.
pub fn base_prefix(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}/AWSLogs/"),
        _ => "AWSLogs/".to_string(),
    }
}

/// True for a 12-digit decimal AWS account ID.
pub fn is_account_id(s: &str) -> bool {
    s.len() == 12 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Last path component of a common prefix like `AWSLogs/123456789012/`.
fn leaf_component(prefix: &str) -> Option<&str> {
    prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

/// Extract the region component following `CloudTrail` in a common prefix.
fn region_component(prefix: &str) -> Option<&str> {
    let mut parts = prefix.split('/');
    while let Some(part) = parts.next() {
        if part == "CloudTrail" {
            return parts.next().filter(|s| !s.is_empty());
        }
    }
    None
}

/// Find all accounts under `base_prefix`, detecting an org-rooted layout.
///
/// The top-level probe lists `base_prefix` with delimiter `/`. An `o-*`
/// identifier marks the bucket as organization-rooted; its child level is
/// then listed for account IDs. Plain 12-digit identifiers are flat
/// accounts. A failure at the top level fails the whole trail; a failure
/// listing the org level skips only the org accounts.
pub async fn discover_accounts(
    client: &Client,
    bucket: &str,
    base_prefix: &str,
) -> Result<AccountDiscovery> {
    let top = list_common_prefixes(client, bucket, base_prefix, 100).await?;

    let mut org_id: Option<String> = None;
    let mut accounts = BTreeSet::new();

    for prefix in &top {
        let Some(id) = leaf_component(prefix) else {
            continue;
        };

        if id.starts_with("o-") {
            org_id = Some(id.to_string());
            let org_prefix = format!("{base_prefix}{id}/");

            match list_common_prefixes(client, bucket, &org_prefix, 1000).await {
                Ok(org_level) => {
                    for org_child in &org_level {
                        if let Some(account) = leaf_component(org_child) {
                            accounts.insert(account.to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        bucket = %bucket,
                        org_id = %id,
                        error = %e,
                        "failed to list organization accounts"
                    );
                }
            }
        } else if is_account_id(id) {
            accounts.insert(id.to_string());
        }
    }

    debug!(
        bucket = %bucket,
        accounts = accounts.len(),
        org_id = ?org_id,
        "discovered accounts"
    );

    Ok(AccountDiscovery {
        accounts: accounts.into_iter().collect(),
        org_id,
    })
}

/// Find the `(account, region)` pairs that actually hold CloudTrail data.
///
/// Runs one probe task per account over `.../{account}/CloudTrail/` with
/// delimiter listing paginated at 1,000. An error for one account is logged
/// and does not poison the others.
pub async fn discover_account_regions(
    client: &Client,
    bucket: &str,
    base_prefix: &str,
    accounts: &[String],
    org_id: Option<&str>,
) -> Vec<AccountRegionPair> {
    let mut tasks = JoinSet::new();

    for account in accounts {
        let client = client.clone();
        let bucket = bucket.to_string();
        let account = account.clone();
        let prefix = match org_id {
            Some(org) => format!("{base_prefix}{org}/{account}/CloudTrail/"),
            None => format!("{base_prefix}{account}/CloudTrail/"),
        };

        tasks.spawn(async move {
            match list_all_common_prefixes(&client, &bucket, &prefix, 1000).await {
                Ok(prefixes) => prefixes
                    .iter()
                    .filter_map(|p| region_component(p))
                    .map(|region| AccountRegionPair {
                        account_id: account.clone(),
                        region: region.to_string(),
                    })
                    .collect::<Vec<_>>(),
                Err(e) => {
                    warn!(
                        bucket = %bucket,
                        account = %account,
                        error = %e,
                        "failed to discover regions"
                    );
                    Vec::new()
                }
            }
        });
    }

    let mut pairs = Vec::new();
    while let Some(result) = tasks.join_next().await {
        if let Ok(mut found) = result {
            pairs.append(&mut found);
        }
    }

    pairs
}
