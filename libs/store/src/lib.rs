//! # drover-store
//!
//! Generic key-value persistence for the orchestrator's entities.
//!
//! The manager keeps one store per entity kind (tasks, task events),
//! each parameterized by its concrete type at construction — callers
//! never downcast. Two interchangeable backends implement the same
//! contract:
//!
//! - [`MemoryStore`]: process-lifetime map, no durability.
//! - [`SqliteStore`]: durable SQLite-backed store with one table
//!   ("bucket") per entity kind, created lazily and idempotently.
//!
//! Keys are the entity's string-formatted identifier; values are stored
//! as self-describing JSON records, so a `put` followed by a `get`
//! returns an equivalent value.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lookup miss.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Encode/decode failure. Treated as corruption of that record:
    /// logged by the caller, not retried.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend I/O failure.
    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    /// Bucket name is not a valid identifier.
    #[error("invalid bucket name: {0}")]
    InvalidBucket(String),
}

impl StoreError {
    /// Returns true for a lookup miss, as opposed to a backend failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Persistence contract shared by both backends.
///
/// Implementations are safe for concurrent use from the manager's
/// control loops.
pub trait Store<T>: Send + Sync {
    /// Upsert `value` under `key`. Atomic on the durable backend.
    fn put(&self, key: &str, value: &T) -> Result<(), StoreError>;

    /// Fetch the value stored under `key`.
    fn get(&self, key: &str) -> Result<T, StoreError>;

    /// Snapshot of all stored values, consistent with respect to
    /// concurrent writers.
    fn list(&self) -> Result<Vec<T>, StoreError>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize, StoreError>;
}
