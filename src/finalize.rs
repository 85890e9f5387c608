//! The finalizer: first-time completion path that establishes the
//! verification oracle for a batch.

use crate::error::{CoreError, CoreResult};
use crate::models::Worker;
use crate::objectstore::ObjectStore;
use crate::store::{Store, WorkerCommitAction};

pub struct Finalizer<'a> {
    store: &'a dyn Store,
    objects: &'a dyn ObjectStore,
}

impl<'a> Finalizer<'a> {
    pub fn new(store: &'a dyn Store, objects: &'a dyn ObjectStore) -> Self {
        Finalizer { store, objects }
    }

    /// Returns `Ok(())` on success (caller responds 204). If the batch is
    /// already finished this is a race against a concurrent finalize: the
    /// batch row is left untouched and the worker is still released, rather
    /// than overwriting an authoritative size that may already have been
    /// used to verify other workers.
    pub async fn finalize(&self, worker: &Worker, batch_id: &str) -> CoreResult<()> {
        if batch_id.is_empty() {
            return Err(CoreError::EmptyBatchId);
        }

        // Authoritative precondition check: validated against the worker
        // row under lock rather than the possibly-stale `worker` the caller
        // passed in, so a concurrent commit/finalize for the same worker
        // can't slip past this check between `Registry::resolve` and here.
        self.store
            .gate_worker_on_batch(&worker.id, batch_id, WorkerCommitAction::None)
            .await?;

        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(CoreError::UnknownBatch)?;

        if batch.finished {
            tracing::warn!(
                batch_id = %batch_id,
                worker_id = %worker.id,
                "finalize race: batch already finished, releasing worker without rewriting content_size"
            );
            self.store
                .gate_worker_on_batch(&worker.id, batch_id, WorkerCommitAction::Release)
                .await?;
            return Ok(());
        }

        let size = self.objects.head_size(&batch.canonical_object_key()).await?;
        let did_finalize = self.store.record_finalization(batch_id, size).await?;
        if !did_finalize {
            // Lost a race against a concurrent finalize between our read and
            // write; treat identically to the already-finished branch above.
            tracing::warn!(
                batch_id = %batch_id,
                worker_id = %worker.id,
                "finalize race detected at write time"
            );
        } else {
            tracing::info!(batch_id = %batch_id, size, "batch finalized");
        }

        self.store
            .gate_worker_on_batch(&worker.id, batch_id, WorkerCommitAction::Release)
            .await?;
        Ok(())
    }
}
