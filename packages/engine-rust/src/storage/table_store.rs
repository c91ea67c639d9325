//! Table store: the write/read orchestration layer.
//!
//! [`TableStore`] coordinates the in-memory ordered engine, the secondary
//! index manager, the persistence backend, and the mutation observers.
//! Every write is atomic across the store and all indexes: index updates
//! are applied first and undone if the write-through fails, so a write
//! that did not fully propagate is never visible.
//!
//! Concurrency: writes to the same primary key serialize on a per-key
//! lock; writes to different keys proceed independently. Each accepted
//! write gets a sequence number from an atomic counter, which is the
//! total order behind last-writer-wins and the backfill compare-and-set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use strata_core::{IndexSchema, Item, KeyValue, PrimaryKey, TableSchema};
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::index::backfill::{spawn_backfill, BackfillHandle};
use crate::index::manager::{IndexDescription, IndexStatus, SecondaryIndexManager};
use crate::storage::data_store::TableDataStore;
use crate::storage::engine::StorageEngine;
use crate::storage::engines::BTreeStorage;
use crate::storage::mutation_observer::{CompositeMutationObserver, MutationObserver};
use crate::storage::record::VersionedItem;

/// Returns the current wall-clock time as milliseconds since the Unix
/// epoch.
///
/// Millisecond timestamps fit comfortably in i64 until the year 292
/// million.
#[allow(clippy::cast_possible_truncation)]
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A table: schema, ordered primary storage, secondary indexes,
/// persistence, and observers.
pub struct TableStore {
    schema: TableSchema,
    engine: Arc<dyn StorageEngine>,
    indexes: SecondaryIndexManager,
    data_store: Arc<dyn TableDataStore>,
    observer: CompositeMutationObserver,
    config: EngineConfig,
    seq: AtomicU64,
    key_locks: DashMap<Vec<u8>, Arc<Mutex<()>>>,
}

impl TableStore {
    /// Creates a table over the given persistence backend and observers.
    #[must_use]
    pub fn new(
        schema: TableSchema,
        data_store: Arc<dyn TableDataStore>,
        observers: Vec<Arc<dyn MutationObserver>>,
        config: EngineConfig,
    ) -> Self {
        let indexes = SecondaryIndexManager::new(schema.clone());
        Self {
            schema,
            engine: Arc::new(BTreeStorage::new()),
            indexes,
            data_store,
            observer: CompositeMutationObserver::new(observers),
            config,
            seq: AtomicU64::new(0),
            key_locks: DashMap::new(),
        }
    }

    /// Creates an ephemeral in-memory table with default configuration.
    #[must_use]
    pub fn in_memory(schema: TableSchema) -> Self {
        Self::new(
            schema,
            Arc::new(crate::storage::datastores::NullDataStore),
            Vec::new(),
            EngineConfig::default(),
        )
    }

    /// Creates a table and replays the persistence backend into it.
    ///
    /// The sequence counter resumes past the highest replayed sequence,
    /// so post-restart writes still win last-writer-wins against
    /// anything recovered from the log.
    ///
    /// # Errors
    ///
    /// Propagates load failures from the backend; items in the log that
    /// no longer match the schema are rejected as `SchemaMismatch`.
    pub async fn open(
        schema: TableSchema,
        data_store: Arc<dyn TableDataStore>,
        observers: Vec<Arc<dyn MutationObserver>>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let store = Self::new(schema, data_store, observers, config);
        if store.data_store.is_null() {
            return Ok(store);
        }
        let loaded = store.data_store.load_all(&store.schema.name).await?;
        let mut max_seq = 0_u64;
        let now = now_millis();
        for (item, seq) in loaded {
            let key = store.schema.primary_key_of(&item)?.encode();
            store.engine.put(&key, VersionedItem::new(item, seq, now));
            max_seq = max_seq.max(seq);
        }
        store.seq.store(max_seq, Ordering::SeqCst);
        tracing::info!(
            table = %store.schema.name,
            items = store.engine.len(),
            "replayed table from data store"
        );
        Ok(store)
    }

    /// The table schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying ordered storage engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// The secondary index registry.
    #[must_use]
    pub fn indexes(&self) -> &SecondaryIndexManager {
        &self.indexes
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }

    fn lock_for(&self, key: &[u8]) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the per-key lock entry once no writer holds a handle to it.
    /// A later write for the same key recreates it, so the map only holds
    /// locks for keys with a write in flight.
    fn evict_idle_lock(&self, key: &[u8]) {
        self.key_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    // --- Writes ---

    /// Inserts or fully replaces an item, returning the replaced version.
    ///
    /// The item must carry the declared key attributes with matching
    /// types, and any registered index attribute it carries must match
    /// that index's declared type. The write propagates to every index
    /// and the persistence backend before returning, or fails leaving
    /// prior state unchanged.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` on key/index attribute problems; `Internal` if
    /// the persistence backend rejects the write (the in-memory state is
    /// rolled back).
    pub async fn put(&self, item: Item) -> Result<Option<Item>, EngineError> {
        let pk = self.schema.primary_key_of(&item)?;
        self.indexes.validate_item(&item)?;
        let key = pk.encode();
        let result = self.put_under_lock(&pk, &key, item).await;
        self.evict_idle_lock(&key);
        result
    }

    async fn put_under_lock(
        &self,
        pk: &PrimaryKey,
        key: &[u8],
        item: Item,
    ) -> Result<Option<Item>, EngineError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let seq = self.next_seq();
        let old = self.engine.get(key);
        let undo = self
            .indexes
            .apply_put(pk, &item, old.as_ref().map(|r| &r.item), seq);

        if let Err(e) = self.data_store.add(&self.schema.name, key, &item, seq).await {
            self.indexes.undo(undo);
            tracing::warn!(
                table = %self.schema.name,
                key = %pk,
                error = %e,
                "write-through failed; rolled back index updates"
            );
            return Err(EngineError::Internal(e));
        }

        self.engine
            .put(key, VersionedItem::new(item.clone(), seq, now_millis()));
        // An index registered during the persistence await missed the
        // first apply and its backfill may have captured the prior
        // version; re-apply so every index converges on this write. The
        // seq compare-and-set makes the second pass a no-op for indexes
        // that already saw it.
        let _ = self
            .indexes
            .apply_put(pk, &item, old.as_ref().map(|r| &r.item), seq);
        self.observer
            .on_put(pk, &item, old.as_ref().map(|r| &r.item));
        metrics::counter!("strata_engine_puts_total").increment(1);
        Ok(old.map(|r| r.item))
    }

    /// Puts a sequence of items, stopping at the first failure.
    ///
    /// Each put is individually atomic; items applied before the failure
    /// stay applied. Returns the number of items written.
    ///
    /// # Errors
    ///
    /// The first per-item error, unchanged.
    pub async fn put_batch(&self, items: Vec<Item>) -> Result<usize, EngineError> {
        let mut written = 0;
        for item in items {
            self.put(item).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Deletes an item by key, cascading removal from every index.
    ///
    /// Idempotent: deleting an absent key succeeds and returns `None`.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` if the supplied key scalars do not match the
    /// declared key types; `Internal` on persistence failure (rolled
    /// back).
    pub async fn delete(
        &self,
        partition: KeyValue,
        sort: Option<KeyValue>,
    ) -> Result<Option<Item>, EngineError> {
        let pk = self.schema.primary_key_from_values(partition, sort)?;
        let key = pk.encode();
        let result = self.delete_under_lock(&pk, &key).await;
        self.evict_idle_lock(&key);
        result
    }

    async fn delete_under_lock(
        &self,
        pk: &PrimaryKey,
        key: &[u8],
    ) -> Result<Option<Item>, EngineError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let Some(old) = self.engine.get(key) else {
            return Ok(None);
        };

        let seq = self.next_seq();
        let undo = self.indexes.apply_delete(pk, &old.item);

        if let Err(e) = self.data_store.remove(&self.schema.name, key, seq).await {
            self.indexes.undo(undo);
            tracing::warn!(
                table = %self.schema.name,
                key = %pk,
                error = %e,
                "delete write-through failed; rolled back index removals"
            );
            return Err(EngineError::Internal(e));
        }

        self.engine.remove(key);
        // An index registered during the persistence await may have
        // backfilled the record before it left the engine; cascade again
        // so no entry outlives the item.
        let _ = self.indexes.apply_delete(pk, &old.item);
        self.observer.on_delete(pk, &old.item);
        metrics::counter!("strata_engine_deletes_total").increment(1);
        Ok(Some(old.item))
    }

    // --- Reads ---

    /// Fetches an item by key.
    ///
    /// # Errors
    ///
    /// `NotFound` when the key is absent; `SchemaMismatch` when the
    /// supplied key scalars do not match the declared key types.
    pub fn get(&self, partition: KeyValue, sort: Option<KeyValue>) -> Result<Item, EngineError> {
        let pk = self.schema.primary_key_from_values(partition, sort)?;
        self.engine
            .get(&pk.encode())
            .map(|r| r.item)
            .ok_or_else(|| EngineError::NotFound { key: pk.to_string() })
    }

    // --- Index administration ---

    /// Registers a secondary index and starts its background backfill.
    ///
    /// Existing items are folded in by the backfill task; writes arriving
    /// meanwhile are applied to the index immediately. Must be called
    /// from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `IndexAlreadyExists` on a name collision.
    pub fn create_index(&self, schema: IndexSchema) -> Result<BackfillHandle, EngineError> {
        let name = schema.name.clone();
        let state = self.indexes.register(schema)?;
        tracing::info!(table = %self.schema.name, index = %name, "index registered");
        Ok(spawn_backfill(
            Arc::clone(&self.engine),
            self.schema.clone(),
            state,
            self.config.clone(),
        ))
    }

    /// Drops a secondary index, cancelling its backfill if one is
    /// running.
    ///
    /// # Errors
    ///
    /// `IndexNotFound` if the name is not registered.
    pub fn drop_index(&self, name: &str) -> Result<(), EngineError> {
        self.indexes.unregister(name)?;
        tracing::info!(table = %self.schema.name, index = %name, "index dropped");
        Ok(())
    }

    /// Describes every registered index.
    #[must_use]
    pub fn list_indexes(&self) -> Vec<IndexDescription> {
        self.indexes.list()
    }

    /// Current lifecycle status of a registered index.
    ///
    /// # Errors
    ///
    /// `IndexNotFound` for unregistered names.
    pub fn index_status(&self, name: &str) -> Result<IndexStatus, EngineError> {
        Ok(self.indexes.get(name)?.status())
    }

    /// Flushes the persistence backend.
    ///
    /// # Errors
    ///
    /// Propagates backend flush failures.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.data_store.hard_flush().await?;
        Ok(())
    }
}
