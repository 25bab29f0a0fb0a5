//! Durable checkpoint store for listing resumption.
//!
//! One SQLite row per `(bucket, account, region)` triple holds the greatest
//! S3 key enqueued so far. On the next run the lister passes that key as
//! `StartAfter`, so already-enqueued objects are never listed again.
//!
//! Callers for the same triple are serialized by the lister; callers for
//! different triples interleave freely behind the connection mutex.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use tm_error::{Result, TmError};
use tracing::info;

const CREATE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS state (
    bucket TEXT NOT NULL,
    account_id TEXT NOT NULL,
    region TEXT NOT NULL,
    last_processed_key TEXT,
    processed_count INTEGER DEFAULT 0,
    last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (bucket, account_id, region)
)";

/// A persisted checkpoint row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub last_processed_key: String,
    pub processed_count: u64,
    pub last_updated: String,
}

/// SQLite-backed map `(bucket, account, region) -> last_processed_key`.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the state database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| TmError::State(format!("open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| TmError::State(format!("set pragmas: {e}")))?;
        conn.execute(CREATE_TABLE_SQL, [])
            .map_err(|e| TmError::State(format!("create table: {e}")))?;

        info!(path = %path.display(), "initialized state database");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Return the last processed key for a triple, or `""` when no row exists.
    pub fn last_key(&self, bucket: &str, account: &str, region: &str) -> Result<String> {
        let conn = self.conn.lock();
        let key: Option<Option<String>> = conn
            .query_row(
                "SELECT last_processed_key FROM state
                 WHERE bucket = ?1 AND account_id = ?2 AND region = ?3",
                rusqlite::params![bucket, account, region],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| TmError::State(format!("query last key: {e}")))?;

        Ok(key.flatten().unwrap_or_default())
    }

    /// Advance the checkpoint for a triple, bumping `processed_count` and the
    /// update timestamp.
    pub fn upsert_last_key(
        &self,
        bucket: &str,
        account: &str,
        region: &str,
        key: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO state (bucket, account_id, region, last_processed_key, processed_count, last_updated)
             VALUES (?1, ?2, ?3, ?4, 1, CURRENT_TIMESTAMP)
             ON CONFLICT(bucket, account_id, region) DO UPDATE SET
                 last_processed_key = excluded.last_processed_key,
                 processed_count = processed_count + 1,
                 last_updated = CURRENT_TIMESTAMP",
            rusqlite::params![bucket, account, region, key],
        )
        .map_err(|e| TmError::State(format!("update state: {e}")))?;

        Ok(())
    }

    /// Fetch the full checkpoint row for a triple.
    pub fn record(&self, bucket: &str, account: &str, region: &str) -> Result<Option<StateRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT last_processed_key, processed_count, last_updated FROM state
             WHERE bucket = ?1 AND account_id = ?2 AND region = ?3",
            rusqlite::params![bucket, account, region],
            |row| {
                Ok(StateRecord {
                    last_processed_key: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    processed_count: row.get(1)?,
                    last_updated: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| TmError::State(format!("query state record: {e}")))
    }

    /// Flush the WAL into the main database file.
    ///
    /// The connection itself is released on drop.
    pub fn close(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| TmError::State(format!("wal checkpoint: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> StateStore {
        StateStore::open(dir.path().join("state.db")).unwrap()
    }

    #[test]
    fn test_missing_row_yields_empty_string() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let key = store
            .last_key("bucket", "123456789012", "us-east-1")
            .unwrap();
        assert_eq!(key, "");
        assert!(store.record("bucket", "123456789012", "us-east-1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_then_read_back() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .upsert_last_key("bucket", "123456789012", "us-east-1", "AWSLogs/a.json.gz")
            .unwrap();

        let key = store
            .last_key("bucket", "123456789012", "us-east-1")
            .unwrap();
        assert_eq!(key, "AWSLogs/a.json.gz");
    }

    #[test]
    fn test_upsert_increments_processed_count() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .upsert_last_key("bucket", "123456789012", "us-east-1", "key-1")
            .unwrap();
        store
            .upsert_last_key("bucket", "123456789012", "us-east-1", "key-2")
            .unwrap();
        store
            .upsert_last_key("bucket", "123456789012", "us-east-1", "key-3")
            .unwrap();

        let record = store
            .record("bucket", "123456789012", "us-east-1")
            .unwrap()
            .unwrap();
        assert_eq!(record.last_processed_key, "key-3");
        assert_eq!(record.processed_count, 3);
        assert!(!record.last_updated.is_empty());
    }

    #[test]
    fn test_triples_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .upsert_last_key("bucket", "111111111111", "us-east-1", "key-a")
            .unwrap();
        store
            .upsert_last_key("bucket", "111111111111", "eu-west-1", "key-b")
            .unwrap();
        store
            .upsert_last_key("other", "111111111111", "us-east-1", "key-c")
            .unwrap();

        assert_eq!(
            store.last_key("bucket", "111111111111", "us-east-1").unwrap(),
            "key-a"
        );
        assert_eq!(
            store.last_key("bucket", "111111111111", "eu-west-1").unwrap(),
            "key-b"
        );
        assert_eq!(
            store.last_key("other", "111111111111", "us-east-1").unwrap(),
            "key-c"
        );
    }

    #[test]
    fn test_checkpoint_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = StateStore::open(&path).unwrap();
            store
                .upsert_last_key("bucket", "123456789012", "us-east-1", "key-1")
                .unwrap();
            store.close().unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        assert_eq!(
            store.last_key("bucket", "123456789012", "us-east-1").unwrap(),
            "key-1"
        );
    }
}
