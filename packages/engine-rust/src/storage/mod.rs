//! Storage layer.
//!
//! Layered bottom-up: [`StorageEngine`] is the ordered byte-keyed map,
//! [`TableDataStore`] is the write-through persistence seam, and
//! [`TableStore`] ties them together with schema validation, secondary
//! index maintenance, and mutation observers.

pub mod data_store;
pub mod datastores;
pub mod engine;
pub mod engines;
pub mod mutation_observer;
pub mod record;
pub mod table_store;

pub use data_store::TableDataStore;
pub use datastores::{JsonLineDataStore, NullDataStore};
pub use engine::{ScanRange, StorageEngine};
pub use engines::BTreeStorage;
pub use mutation_observer::{CompositeMutationObserver, MutationObserver};
pub use record::VersionedItem;
pub use table_store::TableStore;
