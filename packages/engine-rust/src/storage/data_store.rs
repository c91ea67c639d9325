//! External persistence backend trait for the storage layer.
//!
//! Defines [`TableDataStore`], the abstraction over write-through
//! persistence. The [`TableStore`](super::TableStore) calls
//! [`add()`](TableDataStore::add) / [`remove()`](TableDataStore::remove)
//! on every committed mutation; the implementation decides how the data
//! actually reaches disk.

use async_trait::async_trait;
use strata_core::Item;

/// External persistence backend for a `TableStore`.
///
/// Used as `Arc<dyn TableDataStore>`.
#[async_trait]
pub trait TableDataStore: Send + Sync {
    /// Persist a put. `key` is the encoded primary key; `seq` the
    /// acceptance sequence of the write.
    async fn add(&self, table: &str, key: &[u8], item: &Item, seq: u64) -> anyhow::Result<()>;

    /// Persist a delete.
    async fn remove(&self, table: &str, key: &[u8], seq: u64) -> anyhow::Result<()>;

    /// Load the surviving items of a table, with the `seq` each was last
    /// written at. Deleted keys are absent from the result.
    async fn load_all(&self, table: &str) -> anyhow::Result<Vec<(Item, u64)>>;

    /// Flush pending writes to durable storage.
    async fn hard_flush(&self) -> anyhow::Result<()>;

    /// Whether this is a null (no-op) implementation.
    ///
    /// Returns `false` by default. Null implementations override to
    /// return `true`.
    fn is_null(&self) -> bool {
        false
    }
}
