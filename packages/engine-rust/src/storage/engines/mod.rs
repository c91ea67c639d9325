//! [`StorageEngine`](super::engine::StorageEngine) implementations.

pub mod btree;

pub use btree::BTreeStorage;
