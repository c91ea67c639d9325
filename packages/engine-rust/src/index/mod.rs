//! Secondary index layer: entry key layout, registry with live
//! maintenance, and background backfill.

pub mod backfill;
pub mod keys;
pub mod manager;

pub use backfill::BackfillHandle;
pub use manager::{
    IndexDescription, IndexEntry, IndexState, IndexStatus, SecondaryIndexManager,
};
