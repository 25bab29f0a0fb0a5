//! The trailmirror ingestion pipeline.
//!
//! Listers enumerate checkpointed S3 prefixes and feed a bounded download
//! queue; a downloader pool fetches and decodes log objects into a bounded
//! process queue; a processor pool deduplicates records and writes them to
//! time-partitioned JSONL files. The bounded queues are the backpressure
//! mechanism: peak memory is capped by queue depth, not bucket size.

pub mod download;
pub mod lister;
pub mod pipeline;
pub mod process;
pub mod queue;
pub mod shutdown;
pub mod sink;
pub mod stats;

pub use pipeline::{Pipeline, PipelineConfig};
pub use queue::WorkQueue;
pub use shutdown::ShutdownFlag;
pub use sink::JsonlSink;
pub use stats::{PipelineStats, StatsSnapshot};
