//! Pipeline lifecycle orchestration.
//!
//! Shutdown sequencing: when every lister has returned, the download queue
//! handles are dropped, which closes the downloader channels; the downloader
//! pool drains and exits, closing the process queue the same way; the
//! processor pool drains and exits. Only then do the final flush, filter
//! save, and state close run. The same sequence runs after a cancellation.

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::Client;
use tm_bloom::PersistentFilter;
use tm_discoverer::{base_prefix, discover_account_regions, discover_accounts};
use tm_error::Result;
use tm_state::StateStore;
use tm_types::{DownloadJob, ProcessedFile, Trail};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

use crate::download::download_worker;
use crate::lister::Lister;
use crate::process::process_worker;
use crate::queue::WorkQueue;
use crate::shutdown::ShutdownFlag;
use crate::sink::JsonlSink;
use crate::stats::PipelineStats;

/// Sizing and cadence knobs for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub download_workers: usize,
    pub process_workers: usize,
    pub download_queue_size: usize,
    pub process_queue_size: usize,
    pub list_batch_size: i32,
    pub progress_interval: Duration,
    pub jsonl_flush_interval: Duration,
    pub filter_save_interval: Duration,
}

/// The assembled ingestion pipeline.
pub struct Pipeline {
    client: Client,
    state: Arc<StateStore>,
    filter: Arc<PersistentFilter>,
    sink: Arc<JsonlSink>,
    stats: Arc<PipelineStats>,
    shutdown: ShutdownFlag,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        client: Client,
        state: Arc<StateStore>,
        filter: Arc<PersistentFilter>,
        sink: Arc<JsonlSink>,
        config: PipelineConfig,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            client,
            state,
            filter,
            sink,
            stats: Arc::new(PipelineStats::new()),
            shutdown,
            config,
        }
    }

    /// Shared statistics for progress reporting and the final summary.
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Run the pipeline over the given trails until every discovered work
    /// unit is exhausted or shutdown is signaled.
    pub async fn run(&self, trails: &[Trail]) -> Result<()> {
        info!(
            trails = trails.len(),
            download_workers = self.config.download_workers,
            process_workers = self.config.process_workers,
            "starting pipeline"
        );

        let tickers = self.spawn_tickers();

        let (process_queue, process_receivers) = WorkQueue::<ProcessedFile>::new(
            self.config.process_workers,
            self.config.process_queue_size,
        );
        let process_queue = Arc::new(process_queue);

        let mut processors = JoinSet::new();
        for rx in process_receivers {
            processors.spawn(process_worker(
                rx,
                self.sink.clone(),
                self.filter.clone(),
                self.stats.clone(),
            ));
        }

        let (download_queue, download_receivers) = WorkQueue::<DownloadJob>::new(
            self.config.download_workers,
            self.config.download_queue_size,
        );
        let download_queue = Arc::new(download_queue);

        let mut downloaders = JoinSet::new();
        for rx in download_receivers {
            downloaders.spawn(download_worker(
                self.client.clone(),
                rx,
                process_queue.clone(),
                self.stats.clone(),
                self.shutdown.clone(),
            ));
        }
        drop(process_queue);

        let mut trail_tasks = JoinSet::new();
        for trail in trails.iter().cloned() {
            trail_tasks.spawn(run_trail(
                self.client.clone(),
                self.state.clone(),
                self.stats.clone(),
                download_queue.clone(),
                self.shutdown.clone(),
                self.config.list_batch_size,
                trail,
            ));
        }
        drop(download_queue);

        while trail_tasks.join_next().await.is_some() {}
        while downloaders.join_next().await.is_some() {}
        while processors.join_next().await.is_some() {}

        for ticker in tickers {
            ticker.abort();
        }

        info!("flushing buffers and saving state");
        self.sink.flush_all();
        self.stats.set_jsonl_files(self.sink.files_written());
        if let Err(e) = self.filter.save() {
            error!(error = %e, "failed to save dedup filter");
        }
        if let Err(e) = self.state.close() {
            error!(error = %e, "failed to close state store");
        }
        info!("state saved");

        Ok(())
    }

    fn spawn_tickers(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(3);

        {
            let stats = self.stats.clone();
            let sink = self.sink.clone();
            let period = self.config.progress_interval;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    stats.set_jsonl_files(sink.files_written());
                    stats.log_progress();
                }
            }));
        }

        {
            let sink = self.sink.clone();
            let period = self.config.jsonl_flush_interval;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    sink.flush_all();
                }
            }));
        }

        {
            let filter = self.filter.clone();
            let period = self.config.filter_save_interval;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = filter.save() {
                        error!(error = %e, "failed to save dedup filter");
                    }
                }
            }));
        }

        handles
    }
}

/// Discover one trail's work units and run a lister per pair, all sharing
/// the download queue.
async fn run_trail(
    client: Client,
    state: Arc<StateStore>,
    stats: Arc<PipelineStats>,
    queue: Arc<WorkQueue<DownloadJob>>,
    shutdown: ShutdownFlag,
    list_batch_size: i32,
    trail: Trail,
) {
    info!(
        trail = %trail.name,
        bucket = %trail.bucket,
        prefix = trail.prefix.as_deref().unwrap_or(""),
        "processing trail"
    );

    let base = base_prefix(trail.prefix.as_deref());

    let discovery = match discover_accounts(&client, &trail.bucket, &base).await {
        Ok(discovery) => discovery,
        Err(e) => {
            stats.record_error();
            error!(trail = %trail.name, error = %e, "trail discovery failed, skipping trail");
            return;
        }
    };

    if let Some(org_id) = &discovery.org_id {
        info!(trail = %trail.name, org_id = %org_id, "AWS Organization detected");
    }
    info!(
        trail = %trail.name,
        count = discovery.accounts.len(),
        "discovered accounts"
    );

    let pairs = discover_account_regions(
        &client,
        &trail.bucket,
        &base,
        &discovery.accounts,
        discovery.org_id.as_deref(),
    )
    .await;
    info!(
        trail = %trail.name,
        count = pairs.len(),
        "discovered account/region combinations with data"
    );

    let mut listers = JoinSet::new();
    for pair in pairs {
        let lister = Lister {
            client: client.clone(),
            state: state.clone(),
            stats: stats.clone(),
            queue: queue.clone(),
            shutdown: shutdown.clone(),
            bucket: trail.bucket.clone(),
            base_prefix: base.clone(),
            org_id: discovery.org_id.clone(),
            pair,
            list_batch_size,
        };
        listers.spawn(lister.run());
    }
    while listers.join_next().await.is_some() {}

    info!(trail = %trail.name, "finished processing trail");
}
