//! In-memory `Store` used by the dispatch/commit/finalize unit tests so they
//! don't need a live Postgres instance. Mirrors the transactional semantics
//! of `PgStore`: `bind_worker_to_batch`/`gate_worker_on_batch` each take the
//! `workers` mutex once and perform their check-then-mutate under that
//! single lock, the same compare-and-set guarantee `PgStore` gets from
//! `SELECT ... FOR UPDATE` inside a transaction.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::IteratorRandom;
use rand::Rng;

use crate::error::{CoreError, CoreResult};
use crate::models::{Batch, Stats, Worker};

use super::{StagingTable, Store, WorkerCommitAction};

pub struct MockStore {
    workers: Mutex<HashMap<String, Worker>>,
    batches: Mutex<HashMap<String, Batch>>,
    authoritative: Mutex<HashMap<StagingTable, std::collections::HashSet<String>>>,
    staging: Mutex<HashMap<StagingTable, std::collections::HashSet<String>>>,
    rng_seed: Mutex<rand::rngs::StdRng>,
}

impl MockStore {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        MockStore {
            workers: Mutex::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
            authoritative: Mutex::new(HashMap::new()),
            staging: Mutex::new(HashMap::new()),
            rng_seed: Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)),
        }
    }

    pub fn insert_worker(&self, worker: Worker) {
        self.workers.lock().unwrap().insert(worker.id.clone(), worker);
    }

    pub fn insert_batch(&self, batch: Batch) {
        self.batches.lock().unwrap().insert(batch.id.clone(), batch);
    }

    pub fn seed_authoritative(&self, table: StagingTable, ids: impl IntoIterator<Item = String>) {
        self.authoritative
            .lock()
            .unwrap()
            .entry(table)
            .or_default()
            .extend(ids);
    }

    pub fn worker(&self, id: &str) -> Option<Worker> {
        self.workers.lock().unwrap().get(id).cloned()
    }

    pub fn batch(&self, id: &str) -> Option<Batch> {
        self.batches.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl Store for MockStore {
    async fn get_worker(&self, id: &str) -> CoreResult<Option<Worker>> {
        Ok(self.workers.lock().unwrap().get(id).cloned())
    }

    async fn enroll_worker(&self, id: &str, ip: &str) -> CoreResult<()> {
        let mut workers = self.workers.lock().unwrap();
        if workers.contains_key(id) {
            return Err(CoreError::Internal(anyhow::anyhow!(
                "worker id collision"
            )));
        }
        workers.insert(
            id.to_string(),
            Worker {
                id: id.to_string(),
                ip: ip.to_string(),
                reputation: 0,
                disabled: false,
                current_batch: None,
                last_committed: None,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn count_workers_by_ip(&self, ip: &str) -> CoreResult<i64> {
        Ok(self
            .workers
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.ip == ip)
            .count() as i64)
    }

    async fn workers_for_ip(&self, ip: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .workers
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.ip == ip)
            .map(|w| w.id.clone())
            .collect())
    }

    async fn get_batch(&self, id: &str) -> CoreResult<Option<Batch>> {
        Ok(self.batches.lock().unwrap().get(id).cloned())
    }

    async fn pick_random_batch(&self, finished: bool) -> CoreResult<Option<Batch>> {
        let batches = self.batches.lock().unwrap();
        let mut rng = self.rng_seed.lock().unwrap();
        Ok(batches
            .values()
            .filter(|b| b.finished == finished)
            .choose(&mut *rng)
            .cloned())
    }

    async fn count_finished_batches(&self) -> CoreResult<i64> {
        Ok(self
            .batches
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.finished)
            .count() as i64)
    }

    async fn count_unfinished_batches(&self) -> CoreResult<i64> {
        Ok(self
            .batches
            .lock()
            .unwrap()
            .values()
            .filter(|b| !b.finished)
            .count() as i64)
    }

    async fn bind_worker_to_batch(&self, worker_id: &str, batch_id: &str) -> CoreResult<()> {
        let mut workers = self.workers.lock().unwrap();
        let worker = workers
            .get_mut(worker_id)
            .ok_or(CoreError::UnknownWorker)?;
        if worker.disabled {
            return Err(CoreError::WorkerDisabled);
        }
        if let Some(current) = &worker.current_batch {
            return Err(CoreError::MustCommitCurrent {
                batch_id: current.clone(),
            });
        }
        worker.current_batch = Some(batch_id.to_string());
        Ok(())
    }

    async fn gate_worker_on_batch(
        &self,
        worker_id: &str,
        expected_batch_id: &str,
        action: WorkerCommitAction,
    ) -> CoreResult<()> {
        let mut workers = self.workers.lock().unwrap();
        let worker = workers
            .get_mut(worker_id)
            .ok_or(CoreError::UnknownWorker)?;
        if worker.disabled {
            return Err(CoreError::WorkerDisabled);
        }
        match &worker.current_batch {
            Some(current) if current == expected_batch_id => {}
            Some(current) => {
                return Err(CoreError::MustCommitCurrent {
                    batch_id: current.clone(),
                })
            }
            None => return Err(CoreError::ForbiddenBatch),
        }

        match action {
            WorkerCommitAction::None => {}
            WorkerCommitAction::Release => {
                worker.current_batch = None;
                worker.reputation += 1;
                worker.last_committed = Some(Utc::now());
            }
            WorkerCommitAction::Penalise(delta) => {
                worker.reputation -= delta;
                if worker.reputation < 0 {
                    worker.disabled = true;
                }
            }
        }
        Ok(())
    }

    async fn record_versioned_overwrite(&self, batch_id: &str, new_size: i64) -> CoreResult<i64> {
        let mut batches = self.batches.lock().unwrap();
        let batch = batches.get_mut(batch_id).ok_or(CoreError::UnknownBatch)?;
        let pre_increment_version = batch.version;
        batch.content_size = Some(new_size);
        batch.version += 1;
        Ok(pre_increment_version)
    }

    async fn record_finalization(&self, batch_id: &str, size: i64) -> CoreResult<bool> {
        let mut batches = self.batches.lock().unwrap();
        let batch = batches.get_mut(batch_id).ok_or(CoreError::UnknownBatch)?;
        if batch.finished {
            return Ok(false);
        }
        batch.content_size = Some(size);
        batch.finished = true;
        Ok(true)
    }

    async fn stats(&self) -> CoreResult<Stats> {
        let batches = self.batches.lock().unwrap();
        let workers = self.workers.lock().unwrap();
        let active_cutoff = Utc::now() - chrono::Duration::hours(1);
        Ok(Stats {
            batch_count: batches.len() as i64,
            batch_finished: batches.values().filter(|b| b.finished).count() as i64,
            content_size: batches
                .values()
                .filter_map(|b| b.content_size)
                .sum(),
            worker_count: workers.len() as i64,
            worker_active: workers
                .values()
                .filter(|w| w.last_committed.map(|t| t > active_cutoff).unwrap_or(false))
                .count() as i64,
        })
    }

    async fn stage_submissions(
        &self,
        table: StagingTable,
        ids: &[String],
    ) -> CoreResult<Vec<String>> {
        let authoritative = self.authoritative.lock().unwrap();
        let known_authoritative = authoritative.get(&table).cloned().unwrap_or_default();
        drop(authoritative);

        let mut staging = self.staging.lock().unwrap();
        let staged = staging.entry(table).or_default();

        let mut inserted = Vec::new();
        for id in ids {
            if known_authoritative.contains(id) || staged.contains(id) {
                continue;
            }
            staged.insert(id.clone());
            inserted.push(id.clone());
        }
        Ok(inserted)
    }
}
