//! S3 discovery for trailmirror.
//!
//! This crate provides the S3-facing half of the pipeline:
//!
//! - S3 client construction with timeout tuning and LocalStack support
//! - Paginated object listing with `StartAfter` resumption
//! - Delimiter-based common-prefix listing for cheap branch pruning
//! - Per-trail layout discovery: which accounts and regions actually hold
//!   CloudTrail data, and whether the bucket is organization-rooted
//!
//! Delimiter listing is what makes discovery cheap: a fleet-wide CloudTrail
//! bucket can hold millions of objects, but the account and region levels of
//! the hierarchy are enumerable in a handful of list calls.

pub mod discovery;
pub mod list;
pub mod s3;

pub use discovery::{
    base_prefix, discover_account_regions, discover_accounts, is_account_id, AccountDiscovery,
};
pub use list::{list_all_common_prefixes, list_common_prefixes, list_objects, S3Object};
pub use s3::{create_s3_client, S3ClientConfig};
