//! Approximate-membership dedup filter with atomic-replace persistence.
//!
//! The filter answers "have we written this event ID before?" across runs.
//! False positives are possible (an event is wrongly treated as a duplicate,
//! bounded by the configured rate); false negatives are not.
//!
//! On disk the filter is a single opaque file, replaced atomically via a
//! sibling temp file and rename so an external reader never observes a
//! partial image.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use parking_lot::RwLock;
use tm_error::Result;
use tracing::{debug, info, warn};

mod filter;

pub use filter::BloomFilter;

const MAGIC: [u8; 4] = *b"TMBF";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// A shared dedup filter backed by a file.
///
/// Readers (the processor pool) vastly outnumber the single-event writers,
/// so membership checks take the shared side of the lock.
pub struct PersistentFilter {
    inner: RwLock<BloomFilter>,
    path: PathBuf,
}

impl PersistentFilter {
    /// Load the filter from disk, or create a fresh one.
    ///
    /// A missing file yields a new filter sized by `(expected_items,
    /// false_positive_rate)`. An unreadable or invalid file is logged and
    /// also replaced by a fresh filter rather than aborting the run.
    pub fn load(
        path: impl Into<PathBuf>,
        expected_items: u64,
        false_positive_rate: f64,
    ) -> Self {
        let path = path.into();

        let filter = match fs::read(&path) {
            Ok(bytes) => match decode(&bytes) {
                Some(filter) => {
                    info!(path = %path.display(), "loaded dedup filter from disk");
                    filter
                }
                None => {
                    warn!(path = %path.display(), "dedup filter file invalid, creating new one");
                    BloomFilter::with_capacity(expected_items, false_positive_rate)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    capacity = expected_items,
                    false_positive_rate, "creating new dedup filter"
                );
                BloomFilter::with_capacity(expected_items, false_positive_rate)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read dedup filter, creating new one"
                );
                BloomFilter::with_capacity(expected_items, false_positive_rate)
            }
        };

        Self {
            inner: RwLock::new(filter),
            path,
        }
    }

    /// Test whether a key might have been seen.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.inner.read().contains(key)
    }

    /// Record a key.
    pub fn add(&self, key: &[u8]) {
        self.inner.write().insert(key);
    }

    /// Persist the filter: snapshot under the read lock, write a sibling
    /// temp file, then rename over the target path.
    pub fn save(&self) -> Result<()> {
        let encoded = {
            let filter = self.inner.read();
            encode(&filter)
        };

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, &encoded)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "saved dedup filter");
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn encode(filter: &BloomFilter) -> Vec<u8> {
    let bits = filter.bytes();
    let mut out = Vec::with_capacity(HEADER_LEN + bits.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&filter.num_hashes().to_le_bytes());
    out.extend_from_slice(&filter.num_bits().to_le_bytes());
    out.extend_from_slice(bits);
    out
}

fn decode(data: &[u8]) -> Option<BloomFilter> {
    if data.len() < HEADER_LEN || data[..4] != MAGIC {
        return None;
    }
    let version = u32::from_le_bytes(data[4..8].try_into().ok()?);
    if version != VERSION {
        return None;
    }
    let num_hashes = u32::from_le_bytes(data[8..12].try_into().ok()?);
    let num_bits = u64::from_le_bytes(data[12..20].try_into().ok()?);

    BloomFilter::from_parts(num_bits, num_hashes, data[HEADER_LEN..].to_vec())
}
