//! `generate-config`: enumerate trails via the CloudTrail API and write a
//! config document seeded with defaults.

use std::path::Path;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use tm_types::{Config, Trail};
use tracing::info;

pub async fn execute(output: &Path) -> Result<()> {
    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let cloudtrail = aws_sdk_cloudtrail::Client::new(&aws_config);

    info!("discovering CloudTrail trails");
    let resp = cloudtrail
        .describe_trails()
        .send()
        .await
        .context("describe trails")?;

    let mut config = Config::default();
    for trail in resp.trail_list.unwrap_or_default() {
        let Some(bucket) = trail.s3_bucket_name else {
            continue;
        };
        config.trails.push(Trail {
            name: trail.name.unwrap_or_default(),
            bucket,
            prefix: trail.s3_key_prefix,
        });
    }

    info!(count = config.trails.len(), "discovered trails");

    config
        .save(output)
        .with_context(|| format!("save config to {}", output.display()))?;

    info!(path = %output.display(), "config saved");
    Ok(())
}
