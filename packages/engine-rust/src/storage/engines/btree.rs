//! In-memory [`StorageEngine`] implementation backed by a `BTreeMap`.
//!
//! The primary index is the tree itself: entries are kept ordered by
//! encoded key, so partition-scoped range queries and full scans are
//! bounded tree range walks.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::storage::engine::{ScanRange, StorageEngine};
use crate::storage::record::VersionedItem;

/// Ordered in-memory storage under a [`parking_lot::RwLock`].
///
/// Readers take the shared lock only for the duration of a single bounded
/// scan or point lookup; writers hold the exclusive lock for one map
/// operation. Scans copy out their page, so no lock is held across
/// pagination.
pub struct BTreeStorage {
    entries: RwLock<BTreeMap<Vec<u8>, VersionedItem>>,
}

impl BTreeStorage {
    /// Creates a new, empty `BTreeStorage`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for BTreeStorage {
    fn put(&self, key: &[u8], record: VersionedItem) -> Option<VersionedItem> {
        self.entries.write().insert(key.to_vec(), record)
    }

    fn get(&self, key: &[u8]) -> Option<VersionedItem> {
        self.entries.read().get(key).cloned()
    }

    fn remove(&self, key: &[u8]) -> Option<VersionedItem> {
        self.entries.write().remove(key)
    }

    fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.read().contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn scan(&self, range: &ScanRange, limit: usize) -> Vec<(Vec<u8>, VersionedItem)> {
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

    fn snapshot_iter(&self) -> Vec<(Vec<u8>, VersionedItem)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
