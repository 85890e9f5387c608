//! The persistence gateway: typed access to the coordination relations.
//!
//! `Store` is a trait rather than a concrete pool handle so the dispatch,
//! commit and finalize logic can be exercised against `MockStore` in tests
//! without a live Postgres instance — the same split the corpus uses between
//! a production backend and an in-memory fake behind a narrow trait.

mod pg;

/// In-memory fake kept out of `#[cfg(test)]` so integration tests under
/// `tests/` (a separate compilation unit from this crate's own unit tests)
/// can build a full router against it too.
pub mod mock;

pub use pg::PgStore;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::models::{Batch, Stats, Worker};

/// Which submission staging table an insert targets, paired with the
/// authoritative table it dedups against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingTable {
    Videos,
    Playlists,
    Channels,
}

impl StagingTable {
    pub fn staging_table_name(self) -> &'static str {
        match self {
            StagingTable::Videos => "user_videos",
            StagingTable::Playlists => "user_playlists",
            StagingTable::Channels => "user_channels",
        }
    }

    pub fn authoritative_table_name(self) -> &'static str {
        match self {
            StagingTable::Videos => "videos",
            StagingTable::Playlists => "playlists",
            StagingTable::Channels => "channels",
        }
    }
}

/// Mutating action `gate_worker_on_batch` applies once it has confirmed,
/// under a row lock, that the worker's `current_batch` still equals the
/// batch the caller is committing or finalizing against.
#[derive(Debug, Clone, Copy)]
pub enum WorkerCommitAction {
    /// The precondition still needs checking, but the worker row itself
    /// isn't mutated — the not-yet-finished commit fallthrough and the
    /// trusted-overwrite branch both use this.
    None,
    /// Verification accepted or first-time completion: clear
    /// `current_batch`, bump `reputation` by one, stamp `last_committed`.
    Release,
    /// Untrusted size mismatch: decrease `reputation` by the given
    /// magnitude, disabling the worker if it drops below zero.
    /// `current_batch` stays bound.
    Penalise(i64),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_worker(&self, id: &str) -> CoreResult<Option<Worker>>;

    /// Inserts a new worker row. Callers must already have checked the
    /// per-IP admission cap; this only performs the insert.
    async fn enroll_worker(&self, id: &str, ip: &str) -> CoreResult<()>;

    async fn count_workers_by_ip(&self, ip: &str) -> CoreResult<i64>;

    async fn workers_for_ip(&self, ip: &str) -> CoreResult<Vec<String>>;

    async fn get_batch(&self, id: &str) -> CoreResult<Option<Batch>>;

    /// Returns a uniformly-random batch among those with `finished` matching
    /// the given flag, or `None` if there are none.
    async fn pick_random_batch(&self, finished: bool) -> CoreResult<Option<Batch>>;

    async fn count_finished_batches(&self) -> CoreResult<i64>;

    async fn count_unfinished_batches(&self) -> CoreResult<i64>;

    /// Atomically validates that `worker_id` exists, is not disabled, and
    /// has no `current_batch` bound, then sets `current_batch = batch_id`.
    /// The read and the write happen under the same row lock, so two
    /// concurrent dispatches for the same worker can't both observe "no
    /// current batch" and both succeed — the loser gets
    /// `MustCommitCurrent` naming whichever batch actually won the race.
    async fn bind_worker_to_batch(&self, worker_id: &str, batch_id: &str) -> CoreResult<()>;

    /// Atomically validates that `worker_id`'s `current_batch` equals
    /// `expected_batch_id`, then applies `action` — all under the same row
    /// lock, so a concurrent request against the same worker can't slip a
    /// mutation in between the check and the write. Returns
    /// `MustCommitCurrent`/`ForbiddenBatch` if the worker's current batch
    /// has moved on since the caller last observed it.
    async fn gate_worker_on_batch(
        &self,
        worker_id: &str,
        expected_batch_id: &str,
        action: WorkerCommitAction,
    ) -> CoreResult<()>;

    /// Records a trusted overwrite: sets `content_size = new_size`,
    /// increments `version`, and returns the version number *before* the
    /// increment (used to name the versioned object key).
    async fn record_versioned_overwrite(&self, batch_id: &str, new_size: i64) -> CoreResult<i64>;

    /// Records first-time completion. Returns `true` if this call actually
    /// transitioned the batch to finished, `false` if it was already
    /// finished — a concurrent finalize won the race, and this call must be
    /// a no-op rather than rewrite an authoritative size already used for
    /// verification.
    async fn record_finalization(&self, batch_id: &str, size: i64) -> CoreResult<bool>;

    async fn stats(&self) -> CoreResult<Stats>;

    /// Filters `ids` down to those present in neither the authoritative nor
    /// the staging table, inserts the remainder into the staging table, and
    /// returns the inserted subset.
    async fn stage_submissions(
        &self,
        table: StagingTable,
        ids: &[String],
    ) -> CoreResult<Vec<String>>;
}
