//! Main execution logic for `trailmirror run`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use tm_bloom::PersistentFilter;
use tm_discoverer::{create_s3_client, S3ClientConfig};
use tm_pipeline::{JsonlSink, Pipeline, PipelineConfig, ShutdownFlag, StatsSnapshot};
use tm_state::StateStore;
use tm_types::{Config, Trail};
use tracing::{info, Level};
use tracing_subscriber::fmt;

use crate::args::LogLevel;

/// Initialize logging.
///
/// Logs are written to stderr so stdout remains clean for program output.
pub fn init_logging(level: LogLevel) -> Result<()> {
    let level: Level = level.into();

    fmt::Subscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Execute the pipeline with the given config document.
pub async fn execute(config_path: &Path) -> Result<StatsSnapshot> {
    let config = Config::load(config_path)
        .with_context(|| format!("load config from {}", config_path.display()))?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    info!(path = %config_path.display(), "loaded config from file");

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

    let sts = aws_sdk_sts::Client::new(&aws_config);
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .context("get caller identity")?;
    info!(
        account = identity.account.as_deref().unwrap_or("unknown"),
        "authenticated with AWS"
    );

    std::fs::create_dir_all(&config.events_dir).with_context(|| {
        format!("create events directory {}", config.events_dir.display())
    })?;

    let process_workers = if config.process_workers > 0 {
        config.process_workers
    } else {
        2 * std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    };
    info!(
        download_workers = config.download_workers,
        process_workers, "system configuration"
    );

    let state = Arc::new(
        StateStore::open(&config.state_db).context("open state database")?,
    );
    let filter = Arc::new(PersistentFilter::load(
        &config.bloom_file,
        config.bloom_expected_items,
        config.bloom_false_positive,
    ));
    let sink = Arc::new(JsonlSink::new(&config.events_dir, config.events_per_file));

    let s3 = create_s3_client(&S3ClientConfig::new().with_timeouts(
        Duration::from_secs(config.client_timeout),
        Duration::from_secs(config.dial_timeout),
    ))
    .await
    .context("create S3 client")?;

    let trails = resolve_trails(&config, &aws_config).await?;

    let shutdown = ShutdownFlag::new();
    {
        let flag = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received interrupt signal, shutting down gracefully");
                flag.trigger();
            }
        });
    }

    let pipeline = Pipeline::new(
        s3,
        state,
        filter,
        sink,
        PipelineConfig {
            download_workers: config.download_workers,
            process_workers,
            download_queue_size: config.download_queue_size,
            process_queue_size: config.process_queue_size,
            list_batch_size: config.list_batch_size,
            progress_interval: Duration::from_secs(config.progress_interval),
            jsonl_flush_interval: Duration::from_secs(config.jsonl_flush_interval),
            filter_save_interval: Duration::from_secs(config.state_save_interval),
        },
        shutdown,
    );

    pipeline.run(&trails).await?;
    pipeline.stats().log_progress();
    info!("processing complete");

    Ok(pipeline.stats().snapshot())
}

/// Use the configured trails, or fall back to CloudTrail API discovery when
/// none are declared.
async fn resolve_trails(
    config: &Config,
    aws_config: &aws_config::SdkConfig,
) -> Result<Vec<Trail>> {
    if !config.trails.is_empty() {
        info!(count = config.trails.len(), "processing trails from config");
        return Ok(config.trails.clone());
    }

    info!("no trails configured, discovering via CloudTrail API");
    let cloudtrail = aws_sdk_cloudtrail::Client::new(aws_config);
    let resp = cloudtrail
        .describe_trails()
        .send()
        .await
        .context("describe trails")?;

    let trails: Vec<Trail> = resp
        .trail_list
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| {
            let bucket = t.s3_bucket_name?;
            Some(Trail {
                name: t.name.unwrap_or_default(),
                bucket,
                prefix: t.s3_key_prefix,
            })
        })
        .collect();

    info!(count = trails.len(), "discovered trails");
    Ok(trails)
}
