//! Secondary index registry and live maintenance.
//!
//! [`SecondaryIndexManager`] owns every registered index of a table. The
//! write path calls [`validate_item`](SecondaryIndexManager::validate_item)
//! before taking the key lock and [`apply_put`](SecondaryIndexManager::apply_put)
//! / [`apply_delete`](SecondaryIndexManager::apply_delete) inside it; both
//! return an undo log so the table store can roll the whole write back if
//! a later stage fails (all-or-nothing across store and indexes).
//!
//! Entry installation is a compare-and-set on the item's acceptance
//! sequence: an entry only replaces one derived from an older write. The
//! live path and the backfill path share that rule, which is what makes a
//! write during backfill apply exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::{IndexSchema, Item, PrimaryKey, TableSchema};
use tokio::sync::watch;

use crate::error::EngineError;
use crate::index::keys;
use crate::storage::engine::ScanRange;

/// Lifecycle state of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// Initial backfill over existing items is still running.
    Backfilling,
    /// Backfill completed; the index covers every qualifying item.
    Active,
}

/// One derived record in a secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Primary key of the originating item (logical back-reference).
    pub primary_key: PrimaryKey,
    /// The projected attributes.
    pub projected: Item,
    /// Acceptance sequence of the item version this entry derives from.
    pub seq: u64,
}

/// Outcome of a compare-and-set entry installation.
#[derive(Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The entry was installed (replacing an older one, if any).
    Installed,
    /// An entry derived from an equal or newer write was already present.
    Stale,
}

/// Descriptive snapshot of a registered index.
#[derive(Debug, Clone)]
pub struct IndexDescription {
    /// The index schema.
    pub schema: IndexSchema,
    /// Current lifecycle state.
    pub status: IndexStatus,
    /// Number of entries currently held.
    pub entries: usize,
}

/// Shared state of one registered index.
#[derive(Debug)]
pub struct IndexState {
    schema: IndexSchema,
    entries: RwLock<std::collections::BTreeMap<Vec<u8>, IndexEntry>>,
    status: RwLock<IndexStatus>,
    cancel_tx: watch::Sender<bool>,
}

impl IndexState {
    fn new(schema: IndexSchema) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            schema,
            entries: RwLock::new(std::collections::BTreeMap::new()),
            status: RwLock::new(IndexStatus::Backfilling),
            cancel_tx,
        }
    }

    /// The index schema.
    #[must_use]
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> IndexStatus {
        *self.status.read()
    }

    pub(crate) fn set_status(&self, status: IndexStatus) {
        *self.status.write() = status;
    }

    /// Cancellation receiver for the backfill task.
    pub(crate) fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    pub(crate) fn request_cancel(&self) {
        // Send only fails with no receivers, i.e. no backfill in flight.
        let _ = self.cancel_tx.send(true);
    }

    /// Installs `entry` at `key` unless an entry with an equal or newer
    /// `seq` is already present.
    pub(crate) fn install_if_newer(&self, key: Vec<u8>, entry: IndexEntry) -> InstallOutcome {
        let mut entries = self.entries.write();
        match entries.get(&key) {
            Some(existing) if existing.seq >= entry.seq => InstallOutcome::Stale,
            _ => {
                entries.insert(key, entry);
                InstallOutcome::Installed
            }
        }
    }

    /// Removes the entry at `key` only if it derives from exactly `seq`.
    /// Used by backfill to undo an install that raced a concurrent write.
    pub(crate) fn remove_if_seq(&self, key: &[u8], seq: u64) {
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|existing| existing.seq == seq) {
            entries.remove(key);
        }
    }

    fn restore(&self, key: Vec<u8>, previous: Option<IndexEntry>) {
        let mut entries = self.entries.write();
        match previous {
            Some(entry) => {
                entries.insert(key, entry);
            }
            None => {
                entries.remove(&key);
            }
        }
    }

    /// Up to `limit` entries inside `range`, ascending by entry key.
    pub(crate) fn scan(&self, range: &ScanRange, limit: usize) -> Vec<(Vec<u8>, IndexEntry)> {
        use std::ops::Bound;
        let lower = if range.lower_exclusive {
            Bound::Excluded(range.lower.clone())
        } else {
            Bound::Included(range.lower.clone())
        };
        let upper = match &range.upper {
            Some(bound) => Bound::Excluded(bound.clone()),
            None => Bound::Unbounded,
        };
        self.entries
            .read()
            .range((lower, upper))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries currently in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the index currently has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Derives the entry key for `item`, or `None` when the item lacks
    /// the hash attribute (sparse semantics). Attribute types are assumed
    /// valid; the write path validates before calling.
    pub(crate) fn entry_key_of(&self, item: &Item, primary: &PrimaryKey) -> Option<Vec<u8>> {
        let hash = self.schema.hash_key.extract(item).ok()??;
        let range = match &self.schema.range_key {
            Some(def) => match def.extract(item).ok()? {
                // Range attribute is required for membership when declared.
                Some(value) => Some(value),
                None => return None,
            },
            None => None,
        };
        Some(keys::entry_key(&hash, range.as_ref(), primary))
    }
}

/// One reversible index mutation, recorded by the apply path.
pub struct UndoOp {
    state: Arc<IndexState>,
    key: Vec<u8>,
    previous: Option<IndexEntry>,
}

/// Registry of all secondary indexes of one table.
pub struct SecondaryIndexManager {
    table: TableSchema,
    indexes: RwLock<HashMap<String, Arc<IndexState>>>,
}

impl SecondaryIndexManager {
    /// Creates an empty registry for the given table.
    #[must_use]
    pub fn new(table: TableSchema) -> Self {
        Self {
            table,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new index in the `Backfilling` state.
    ///
    /// # Errors
    ///
    /// [`EngineError::IndexAlreadyExists`] on a name collision.
    pub fn register(&self, schema: IndexSchema) -> Result<Arc<IndexState>, EngineError> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(&schema.name) {
            return Err(EngineError::IndexAlreadyExists { name: schema.name });
        }
        let state = Arc::new(IndexState::new(schema.clone()));
        indexes.insert(schema.name, Arc::clone(&state));
        Ok(state)
    }

    /// Unregisters an index, cancelling any in-flight backfill and
    /// discarding its entries.
    ///
    /// # Errors
    ///
    /// [`EngineError::IndexNotFound`] if the name is not registered.
    pub fn unregister(&self, name: &str) -> Result<(), EngineError> {
        let removed = self.indexes.write().remove(name);
        match removed {
            Some(state) => {
                state.request_cancel();
                Ok(())
            }
            None => Err(EngineError::IndexNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Looks up a registered index.
    ///
    /// # Errors
    ///
    /// [`EngineError::IndexNotFound`] if the name is not registered.
    pub fn get(&self, name: &str) -> Result<Arc<IndexState>, EngineError> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::IndexNotFound {
                name: name.to_string(),
            })
    }

    /// Describes every registered index, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<IndexDescription> {
        let mut described: Vec<IndexDescription> = self
            .indexes
            .read()
            .values()
            .map(|state| IndexDescription {
                schema: state.schema.clone(),
                status: state.status(),
                entries: state.len(),
            })
            .collect();
        described.sort_by(|a, b| a.schema.name.cmp(&b.schema.name));
        described
    }

    /// Checks an incoming item against every registered index: a declared
    /// hash or range attribute that is present must have the declared
    /// type. Absent attributes are fine (sparse semantics).
    ///
    /// # Errors
    ///
    /// [`EngineError::SchemaMismatch`] on the first offending attribute.
    pub fn validate_item(&self, item: &Item) -> Result<(), EngineError> {
        for state in self.indexes.read().values() {
            state.schema.hash_key.extract(item)?;
            if let Some(def) = &state.schema.range_key {
                def.extract(item)?;
            }
        }
        Ok(())
    }

    /// Applies a put to every registered index, returning the undo log.
    ///
    /// Must be called with the per-key write lock held and after
    /// [`validate_item`](Self::validate_item) succeeded.
    #[must_use]
    pub fn apply_put(
        &self,
        primary: &PrimaryKey,
        item: &Item,
        old_item: Option<&Item>,
        seq: u64,
    ) -> Vec<UndoOp> {
        let mut undo = Vec::new();
        for state in self.indexes.read().values() {
            let old_key = old_item.and_then(|old| state.entry_key_of(old, primary));
            let new_key = state.entry_key_of(item, primary);

            // Hash or range value changed: the old entry moves away.
            if let Some(old_key) = old_key {
                if Some(&old_key) != new_key.as_ref() {
                    let previous = state.entries.write().remove(&old_key);
                    if previous.is_some() {
                        undo.push(UndoOp {
                            state: Arc::clone(state),
                            key: old_key,
                            previous,
                        });
                    }
                }
            }

            if let Some(new_key) = new_key {
                let entry = IndexEntry {
                    primary_key: primary.clone(),
                    projected: state.schema.project(item, &self.table),
                    seq,
                };
                let previous = {
                    let mut entries = state.entries.write();
                    let previous = entries.get(&new_key).cloned();
                    if previous.as_ref().is_some_and(|p| p.seq >= seq) {
                        continue;
                    }
                    entries.insert(new_key.clone(), entry);
                    previous
                };
                undo.push(UndoOp {
                    state: Arc::clone(state),
                    key: new_key,
                    previous,
                });
            }
        }
        undo
    }

    /// Applies a delete to every registered index, returning the undo log.
    #[must_use]
    pub fn apply_delete(&self, primary: &PrimaryKey, old_item: &Item) -> Vec<UndoOp> {
        let mut undo = Vec::new();
        for state in self.indexes.read().values() {
            if let Some(key) = state.entry_key_of(old_item, primary) {
                let previous = state.entries.write().remove(&key);
                if previous.is_some() {
                    undo.push(UndoOp {
                        state: Arc::clone(state),
                        key,
                        previous,
                    });
                }
            }
        }
        undo
    }

    /// Reverts a previously returned undo log, newest mutation first.
    pub fn undo(&self, ops: Vec<UndoOp>) {
        for op in ops.into_iter().rev() {
            op.state.restore(op.key, op.previous);
        }
    }
}
