//! Versioned item records for the storage layer.

use serde::{Deserialize, Serialize};
use strata_core::Item;

/// An item plus the write metadata the engine tracks for it.
///
/// `seq` is the acceptance sequence assigned when the write entered the
/// table store. It is the total order behind last-writer-wins resolution
/// and the compare-and-set marker that keeps backfill and live index
/// updates from double-applying or missing a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedItem {
    /// The stored item.
    pub item: Item,
    /// Acceptance sequence of the write that produced this version.
    pub seq: u64,
    /// Wall-clock time (millis since epoch) of the write.
    pub write_time: i64,
}

impl VersionedItem {
    /// Creates a versioned record for a freshly accepted write.
    #[must_use]
    pub fn new(item: Item, seq: u64, write_time: i64) -> Self {
        Self {
            item,
            seq,
            write_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_core::Value;

    use super::*;

    #[test]
    fn new_carries_seq_and_time() {
        let mut item = Item::new();
        item.insert("title".to_string(), Value::String("Alpha".to_string()));
        let record = VersionedItem::new(item.clone(), 7, 1_700_000_000_000);
        assert_eq!(record.item, item);
        assert_eq!(record.seq, 7);
        assert_eq!(record.write_time, 1_700_000_000_000);
    }
}
