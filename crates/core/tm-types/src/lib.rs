//! Core data types for trailmirror.
//!
//! This crate defines the shared vocabulary of the pipeline: the trail and
//! config document declarations, the work-unit types handed between pipeline
//! stages, and the minimal CloudTrail event projection used for routing and
//! deduplication.

pub mod config;
pub mod event;
pub mod work;

pub use config::{Config, Trail};
pub use event::{LogFile, MinimalEvent, UserIdentity};
pub use work::{AccountRegionPair, DownloadJob, ProcessedFile};
