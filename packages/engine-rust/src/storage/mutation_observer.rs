//! Mutation observer trait and composite implementation.
//!
//! Observers react to committed table mutations: statistics, change
//! logging, cache invalidation. They run after the write (including its
//! index propagation) has fully committed, so they are infallible by
//! contract — index maintenance itself is not an observer, because it
//! must be able to fail and roll the write back.

use std::sync::Arc;

use strata_core::{Item, PrimaryKey};

/// Observer for committed mutations in a
/// [`TableStore`](super::TableStore).
///
/// Used as `Arc<dyn MutationObserver>`.
pub trait MutationObserver: Send + Sync {
    /// Called after a put commits. `old_item` is the replaced version,
    /// if the key existed.
    fn on_put(&self, key: &PrimaryKey, item: &Item, old_item: Option<&Item>);

    /// Called after a delete commits. Not called for idempotent deletes
    /// of absent keys.
    fn on_delete(&self, key: &PrimaryKey, item: &Item);
}

/// Composite observer that fans out to multiple observers.
#[derive(Default)]
pub struct CompositeMutationObserver {
    observers: Vec<Arc<dyn MutationObserver>>,
}

impl CompositeMutationObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn MutationObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn MutationObserver>) {
        self.observers.push(observer);
    }
}

impl MutationObserver for CompositeMutationObserver {
    fn on_put(&self, key: &PrimaryKey, item: &Item, old_item: Option<&Item>) {
        for observer in &self.observers {
            observer.on_put(key, item, old_item);
        }
    }

    fn on_delete(&self, key: &PrimaryKey, item: &Item) {
        for observer in &self.observers {
            observer.on_delete(key, item);
        }
    }
}
