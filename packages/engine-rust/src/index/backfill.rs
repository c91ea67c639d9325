//! Background backfill of a newly created secondary index.
//!
//! The backfill walks a snapshot of the table's key space and installs an
//! entry for every item that qualifies for the index. It runs on its own
//! tokio task, holds no lock that blocks foreground writes, and yields
//! between batches. Consistency with concurrent writes comes from the
//! per-entry compare-and-set on the acceptance sequence: the backfill
//! re-reads the live item immediately before installing, installs only if
//! its entry is newer than whatever is present, and verifies afterwards
//! that the item did not change (or disappear) underneath it. When the
//! verification fails it retries with a bounded budget and a small jitter,
//! surfacing `ConflictRetryExhausted` beyond the budget. A failed or
//! cancelled pass leaves the index in `Backfilling`; re-running it is
//! idempotent.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use strata_core::TableSchema;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::index::manager::{IndexEntry, IndexState, IndexStatus};
use crate::storage::engine::StorageEngine;

/// Handle to an in-flight backfill.
pub struct BackfillHandle {
    state: Arc<IndexState>,
    join: tokio::task::JoinHandle<Result<(), EngineError>>,
}

impl BackfillHandle {
    /// Requests cancellation. The task notices at its next batch
    /// boundary and exits without completing the index.
    pub fn cancel(&self) {
        self.state.request_cancel();
    }

    /// Waits for the backfill to finish.
    ///
    /// # Errors
    ///
    /// Propagates `ConflictRetryExhausted` from the pass, or an internal
    /// error if the task panicked.
    pub async fn wait(self) -> Result<(), EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::Internal(anyhow::anyhow!("backfill task failed: {e}")))?
    }
}

/// Spawns the backfill task for a freshly registered index.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_backfill(
    engine: Arc<dyn StorageEngine>,
    table: TableSchema,
    state: Arc<IndexState>,
    config: EngineConfig,
) -> BackfillHandle {
    let cancel_rx = state.subscribe_cancel();
    let task_state = Arc::clone(&state);
    let join = tokio::spawn(async move { run(engine, table, task_state, config, cancel_rx).await });
    BackfillHandle { state, join }
}

async fn run(
    engine: Arc<dyn StorageEngine>,
    table: TableSchema,
    state: Arc<IndexState>,
    config: EngineConfig,
    cancel_rx: watch::Receiver<bool>,
) -> Result<(), EngineError> {
    let index_name = state.schema().name.clone();
    let snapshot_keys: Vec<Vec<u8>> = engine
        .snapshot_iter()
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    tracing::info!(
        index = %index_name,
        candidates = snapshot_keys.len(),
        "starting index backfill"
    );

    let mut installed = 0_u64;
    for (position, key) in snapshot_keys.iter().enumerate() {
        if position % config.backfill_batch_size == 0 {
            if *cancel_rx.borrow() {
                tracing::info!(index = %index_name, position, "backfill cancelled");
                return Ok(());
            }
            tokio::task::yield_now().await;
        }

        if backfill_key(&engine, &table, &state, &config, key).await? {
            installed += 1;
        }
    }

    state.set_status(IndexStatus::Active);
    metrics::counter!("strata_engine_backfilled_entries_total").increment(installed);
    tracing::info!(index = %index_name, installed, "index backfill complete");
    Ok(())
}

/// Backfills a single primary key. Returns whether an entry was installed.
async fn backfill_key(
    engine: &Arc<dyn StorageEngine>,
    table: &TableSchema,
    state: &Arc<IndexState>,
    config: &EngineConfig,
    key: &[u8],
) -> Result<bool, EngineError> {
    for _attempt in 0..config.backfill_retry_budget {
        // Read the live version; the snapshot may be arbitrarily stale.
        let Some(record) = engine.get(key) else {
            return Ok(false); // Deleted since the snapshot.
        };

        let Ok(primary) = table.primary_key_of(&record.item) else {
            return Ok(false); // Cannot happen for items accepted by the store.
        };
        let Some(entry_key) = state.entry_key_of(&record.item, &primary) else {
            return Ok(false); // Sparse: item lacks the index attributes.
        };
        let entry = IndexEntry {
            primary_key: primary,
            projected: state.schema().project(&record.item, table),
            seq: record.seq,
        };
        state.install_if_newer(entry_key.clone(), entry);

        // Verify the item did not change or vanish while installing. If
        // it did, withdraw the entry derived from the stale read (the
        // seq guard leaves anything the live path installed untouched)
        // and retry from the live record.
        match engine.get(key) {
            Some(current) if current.seq == record.seq => return Ok(true),
            _ => {
                state.remove_if_seq(&entry_key, record.seq);
            }
        }

        let jitter = rand::rng().random_range(0..4);
        tokio::time::sleep(Duration::from_millis(1 + jitter)).await;
    }

    Err(EngineError::ConflictRetryExhausted {
        index: state.schema().name.clone(),
        key: format!("0x{}", hex(key)),
    })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
