//! The batch dispatcher: new-work vs. re-verification selection and
//! worker binding.

use rand::Rng;

use crate::error::{CoreError, CoreResult};
use crate::models::{Batch, Worker};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Finished,
    Unfinished,
}

/// Picks between a fresh (unfinished) batch and a re-verification
/// (finished) batch, isolated as a pure function so the `1/(R+1)`
/// probability law can be tested without a store or network.
/// `reputation` must be `>= 0` — callers only reach this after
/// `Registry::resolve`, which rejects disabled (and therefore
/// negative-reputation) workers.
pub fn choose_selection_kind(
    reputation: i64,
    finished_count: i64,
    unfinished_count: i64,
    rng: &mut impl Rng,
) -> Option<SelectionKind> {
    if finished_count == 0 && unfinished_count == 0 {
        return None;
    }

    let draw = rng.gen_range(0..=reputation.max(0));

    if draw == 0 && finished_count > 0 {
        Some(SelectionKind::Finished)
    } else if unfinished_count == 0 && finished_count > 0 {
        Some(SelectionKind::Finished)
    } else {
        Some(SelectionKind::Unfinished)
    }
}

pub struct Dispatcher<'a> {
    store: &'a dyn Store,
}

impl<'a> Dispatcher<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Dispatcher { store }
    }

    /// Selects and binds the next batch for `worker`. Callers must have
    /// already resolved the worker via `Registry::resolve`. The
    /// "worker has no current batch" precondition is enforced by
    /// `Store::bind_worker_to_batch` itself, atomically with the bind, so a
    /// concurrent dispatch for the same worker can't race this one — `worker`
    /// is only read here for its `reputation`, which is fine to use slightly
    /// stale since it only steers the probabilistic selection, not the
    /// binding decision.
    pub async fn dispatch(&self, worker: &Worker, rng: &mut impl Rng) -> CoreResult<Batch> {
        let finished_count = self.store.count_finished_batches().await?;
        let unfinished_count = self.store.count_unfinished_batches().await?;

        let kind = choose_selection_kind(worker.reputation, finished_count, unfinished_count, rng)
            .ok_or(CoreError::NoBatchesAvailable)?;

        let batch = self
            .store
            .pick_random_batch(kind == SelectionKind::Finished)
            .await?
            .ok_or(CoreError::NoBatchesAvailable)?;

        self.store.bind_worker_to_batch(&worker.id, &batch.id).await?;

        tracing::debug!(
            worker_id = %worker.id,
            batch_id = %batch.id,
            reputation = worker.reputation,
            kind = ?kind,
            "dispatched batch"
        );

        Ok(batch)
    }

    /// Idempotent re-fetch of the worker's currently-bound batch.
    pub async fn refetch(&self, worker: &Worker, batch_id: &str) -> CoreResult<Batch> {
        match &worker.current_batch {
            Some(current) if current == batch_id => self
                .store
                .get_batch(batch_id)
                .await?
                .ok_or(CoreError::UnknownBatch),
            _ => Err(CoreError::ForbiddenBatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn reputation_zero_always_reverifies_when_finished_exist() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_eq!(
                choose_selection_kind(0, 3, 3, &mut rng),
                Some(SelectionKind::Finished)
            );
        }
    }

    #[test]
    fn only_unfinished_available_when_no_finished_batches() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_eq!(
                choose_selection_kind(50, 0, 5, &mut rng),
                Some(SelectionKind::Unfinished)
            );
        }
    }

    #[test]
    fn only_finished_available_when_no_unfinished_batches() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_eq!(
                choose_selection_kind(50, 5, 0, &mut rng),
                Some(SelectionKind::Finished)
            );
        }
    }

    #[test]
    fn no_batches_available_is_none() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        assert_eq!(choose_selection_kind(0, 0, 0, &mut rng), None);
    }

    /// Verifies the `1/(R+1)` re-verification probability law with a
    /// seeded RNG over 10^4 trials, for a handful of representative
    /// reputations.
    #[test]
    fn dispatch_probability_law() {
        for reputation in [0i64, 1, 4, 9, 99] {
            let mut rng = rand::rngs::StdRng::seed_from_u64(42 + reputation as u64);
            let trials = 10_000;
            let mut finished_hits = 0;
            for _ in 0..trials {
                if choose_selection_kind(reputation, 10, 10, &mut rng)
                    == Some(SelectionKind::Finished)
                {
                    finished_hits += 1;
                }
            }
            let observed = finished_hits as f64 / trials as f64;
            let expected = 1.0 / (reputation as f64 + 1.0);
            assert!(
                (observed - expected).abs() < 0.02,
                "reputation={reputation}: observed={observed}, expected={expected}"
            );
        }
    }

    fn worker(id: &str) -> Worker {
        Worker {
            id: id.to_string(),
            ip: "127.0.0.1".to_string(),
            reputation: 0,
            disabled: false,
            current_batch: None,
            last_committed: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn unfinished_batch(id: &str) -> crate::models::Batch {
        crate::models::Batch {
            id: id.to_string(),
            start_ctid: "a".into(),
            end_ctid: "b".into(),
            finished: false,
            content_size: None,
            videos: vec![],
            version: 0,
        }
    }

    /// `bind_worker_to_batch` is a compare-and-set: once a worker holds a
    /// batch, a second bind attempt must fail with `MustCommitCurrent`
    /// naming the batch that actually won, never silently overwrite it.
    #[tokio::test]
    async fn second_bind_for_same_worker_is_rejected() {
        let store = MockStore::new(1);
        store.insert_worker(worker("w1"));

        store.bind_worker_to_batch("w1", "B1").await.unwrap();
        let err = store
            .bind_worker_to_batch("w1", "B2")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoreError::MustCommitCurrent { batch_id } if batch_id == "B1"
        ));
        assert_eq!(
            store.worker("w1").unwrap().current_batch.as_deref(),
            Some("B1")
        );
    }

    /// Two concurrent `Dispatcher::dispatch` calls for the same worker must
    /// not both succeed — exactly one should bind, the other must observe
    /// the winner's batch via `MustCommitCurrent` rather than clobbering it.
    #[tokio::test]
    async fn concurrent_dispatch_for_same_worker_only_binds_once() {
        let store = Arc::new(MockStore::new(1));
        store.insert_worker(worker("w1"));
        store.insert_batch(unfinished_batch("B1"));
        store.insert_batch(unfinished_batch("B2"));

        let w = store.worker("w1").unwrap();

        let run = |store: Arc<MockStore>, w: Worker| async move {
            let dispatcher = Dispatcher::new(store.as_ref());
            let mut rng = rand::rngs::StdRng::seed_from_u64(1);
            dispatcher.dispatch(&w, &mut rng).await
        };

        let (first, second) = tokio::join!(
            run(store.clone(), w.clone()),
            run(store.clone(), w.clone())
        );

        let results = [first, second];
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        let rejected_count = results
            .iter()
            .filter(|r| matches!(r, Err(CoreError::MustCommitCurrent { .. })))
            .count();

        assert_eq!(ok_count, 1, "exactly one dispatch should win the race");
        assert_eq!(rejected_count, 1, "the loser must see MustCommitCurrent");

        let bound_batch = results
            .iter()
            .find_map(|r| r.as_ref().ok())
            .map(|b| b.id.clone())
            .unwrap();
        assert_eq!(
            store.worker("w1").unwrap().current_batch.as_deref(),
            Some(bound_batch.as_str())
        );
    }
}
