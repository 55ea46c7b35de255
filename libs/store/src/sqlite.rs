//! SQLite store backend.
//!
//! One table ("bucket") per entity kind, keyed by the entity's
//! string-formatted id, values stored as JSON text. Each operation is a
//! single statement, so writes commit atomically and `list` reads a
//! consistent snapshot.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::{Store, StoreError};

/// Durable, transactional store over an embedded SQLite database.
///
/// The connection is owned behind a mutex, which serializes access from
/// the manager's concurrently running loops.
pub struct SqliteStore<T> {
    conn: Mutex<Connection>,
    bucket: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for SqliteStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl<T> SqliteStore<T> {
    /// Open or create the database at `path` and ensure `bucket` exists.
    pub fn open<P: AsRef<Path>>(path: P, bucket: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // WAL keeps readers from blocking the writer.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn, bucket)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(bucket: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, bucket)
    }

    fn with_connection(conn: Connection, bucket: &str) -> Result<Self, StoreError> {
        validate_bucket(bucket)?;

        let store = Self {
            conn: Mutex::new(conn),
            bucket: bucket.to_string(),
            _entity: PhantomData,
        };
        store.create_bucket()?;

        Ok(store)
    }

    /// Create the bucket table if it does not already exist. A bucket
    /// that already exists is left untouched, data included.
    fn create_bucket(&self) -> Result<(), StoreError> {
        self.lock().execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            self.bucket
        ))?;

        debug!(bucket = %self.bucket, "Bucket ready");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bucket names are interpolated into statements, so they must be plain
/// identifiers.
fn validate_bucket(bucket: &str) -> Result<(), StoreError> {
    let mut chars = bucket.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidBucket(bucket.to_string()))
    }
}

impl<T> Store<T> for SqliteStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn put(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(value)?;

        self.lock().execute(
            &format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                self.bucket
            ),
            params![key, encoded],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<T, StoreError> {
        let encoded: Option<String> = self
            .lock()
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", self.bucket),
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match encoded {
            Some(encoded) => Ok(serde_json::from_str(&encoded)?),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT value FROM {} ORDER BY key",
            self.bucket
        ))?;

        let encoded = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        encoded
            .iter()
            .map(|v| serde_json::from_str(v).map_err(StoreError::from))
            .collect()
    }

    fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self.lock().query_row(
            &format!("SELECT COUNT(*) FROM {}", self.bucket),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
