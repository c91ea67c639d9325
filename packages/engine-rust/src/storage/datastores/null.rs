//! No-op [`TableDataStore`] implementation.
//!
//! [`NullDataStore`] discards all writes and returns empty results on
//! load. This is the default backend for tables that do not require
//! durability beyond the in-memory engine.

use async_trait::async_trait;
use strata_core::Item;

use crate::storage::data_store::TableDataStore;

/// No-op `TableDataStore` for ephemeral tables and tests.
pub struct NullDataStore;

#[async_trait]
impl TableDataStore for NullDataStore {
    async fn add(&self, _table: &str, _key: &[u8], _item: &Item, _seq: u64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn remove(&self, _table: &str, _key: &[u8], _seq: u64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load_all(&self, _table: &str) -> anyhow::Result<Vec<(Item, u64)>> {
        Ok(Vec::new())
    }

    async fn hard_flush(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_null(&self) -> bool {
        true
    }
}
