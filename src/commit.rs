//! The commit verifier: size-consistency check against the
//! verification oracle, with reputation-driven branching between
//! acceptance, penalty, and trusted overwrite.

use crate::error::{CoreError, CoreResult};
use crate::models::Worker;
use crate::objectstore::ObjectStore;
use crate::store::{Store, WorkerCommitAction};

/// Penalty applied to reputation on an untrusted size mismatch.
pub const SIZE_MISMATCH_PENALTY: i64 = 10;

pub struct CommitOutcome {
    /// Empty string means "verified, nothing to upload".
    pub upload_url: String,
}

pub struct CommitVerifier<'a> {
    store: &'a dyn Store,
    objects: &'a dyn ObjectStore,
    content_threshold: f64,
    trusted_reputation: i64,
}

impl<'a> CommitVerifier<'a> {
    pub fn new(
        store: &'a dyn Store,
        objects: &'a dyn ObjectStore,
        content_threshold: f64,
        trusted_reputation: i64,
    ) -> Self {
        CommitVerifier {
            store,
            objects,
            content_threshold,
            trusted_reputation,
        }
    }

    pub async fn commit(
        &self,
        worker: &Worker,
        batch_id: &str,
        content_size: i64,
    ) -> CoreResult<CommitOutcome> {
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

        if !batch.finished {
            // Not the verifier's job: the worker hasn't uploaded anything
            // yet for this batch. Issue a presigned PUT to the canonical key
            // and let `/api/finalize` establish the oracle.
            let url = self
                .objects
                .presign_put(&batch.canonical_object_key(), content_size)
                .await?;
            return Ok(CommitOutcome { upload_url: url });
        }

        let authoritative_size = batch
            .content_size
            .expect("finished batch always has content_size");

        let discrepancy = relative_discrepancy(content_size, authoritative_size);

        if discrepancy < self.content_threshold {
            self.store
                .gate_worker_on_batch(&worker.id, batch_id, WorkerCommitAction::Release)
                .await?;
            tracing::info!(
                worker_id = %worker.id,
                batch_id = %batch_id,
                discrepancy,
                "verification accepted"
            );
            return Ok(CommitOutcome {
                upload_url: String::new(),
            });
        }

        if worker.reputation > self.trusted_reputation {
            let pre_increment_version = self
                .store
                .record_versioned_overwrite(batch_id, content_size)
                .await?;
            let key = batch.versioned_object_key(pre_increment_version);
            let url = self.objects.presign_put(&key, content_size).await?;
            tracing::warn!(
                worker_id = %worker.id,
                batch_id = %batch_id,
                discrepancy,
                new_version = pre_increment_version + 1,
                "trusted overwrite accepted"
            );
            return Ok(CommitOutcome { upload_url: url });
        }

        self.store
            .gate_worker_on_batch(
                &worker.id,
                batch_id,
                WorkerCommitAction::Penalise(SIZE_MISMATCH_PENALTY),
            )
            .await?;
        tracing::warn!(
            worker_id = %worker.id,
            batch_id = %batch_id,
            discrepancy,
            "size mismatch penalty applied"
        );
        Err(CoreError::SizeMismatch {
            batch_id: batch_id.to_string(),
        })
    }
}

/// `|reported - authoritative| / authoritative`, with the degenerate
/// zero-length case treated as an exact match only when both sides are zero.
fn relative_discrepancy(reported: i64, authoritative: i64) -> f64 {
    if authoritative == 0 {
        return if reported == 0 { 0.0 } else { f64::INFINITY };
    }
    (reported - authoritative).unsigned_abs() as f64 / authoritative as f64
}
