//! The worker registry: enrollment, per-IP admission, and identity
//! resolution. Every protected endpoint calls `resolve` first.

use rand::RngCore;

use crate::error::{CoreError, CoreResult};
use crate::models::Worker;
use crate::store::Store;

/// Generates a fresh opaque worker identity: 128 bits of randomness,
/// hex-encoded, matching the "random 128-bit, textual form" contract.
pub fn generate_worker_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct Registry<'a> {
    store: &'a dyn Store,
    max_workers_per_ip: i64,
}

impl<'a> Registry<'a> {
    pub fn new(store: &'a dyn Store, max_workers_per_ip: i64) -> Self {
        Registry {
            store,
            max_workers_per_ip,
        }
    }

    /// Enrolls a new worker for `ip`, returning its freshly-generated id.
    /// Rejects with `TooManyWorkers` once the IP has reached the cap.
    pub async fn create_worker(&self, ip: &str) -> CoreResult<String> {
        let existing = self.store.count_workers_by_ip(ip).await?;
        if existing > self.max_workers_per_ip {
            return Err(CoreError::TooManyWorkers);
        }

        // Retry on the astronomically unlikely event of a hex-id collision
        // rather than trusting a single draw; bounds the loop so a
        // persistently broken RNG can't hang a request.
        for _ in 0..4 {
            let id = generate_worker_id();
            match self.store.enroll_worker(&id, ip).await {
                Ok(()) => return Ok(id),
                Err(CoreError::Internal(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(CoreError::Internal(anyhow::anyhow!(
            "failed to allocate a unique worker id"
        )))
    }

    /// Resolves `worker_id`, rejecting unknown or disabled workers. Every
    /// protected operation in dispatch/commit/finalize starts here.
    pub async fn resolve(&self, worker_id: &str) -> CoreResult<Worker> {
        let worker = self
            .store
            .get_worker(worker_id)
            .await?
            .ok_or(CoreError::UnknownWorker)?;
        if worker.disabled {
            return Err(CoreError::WorkerDisabled);
        }
        Ok(worker)
    }

    pub async fn workers_for_ip(&self, ip: &str) -> CoreResult<Vec<String>> {
        self.store.workers_for_ip(ip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;

    #[tokio::test]
    async fn enrolls_until_ip_cap_then_rejects() {
        let store = MockStore::new(1);
        let registry = Registry::new(&store, 2);

        // Rejection only kicks in once more than `max_workers_per_ip` are
        // already registered.
        registry.create_worker("1.2.3.4").await.unwrap();
        registry.create_worker("1.2.3.4").await.unwrap();
        registry.create_worker("1.2.3.4").await.unwrap();
        let err = registry.create_worker("1.2.3.4").await.unwrap_err();
        assert!(matches!(err, CoreError::TooManyWorkers));

        // A different IP is unaffected by the first IP's cap.
        registry.create_worker("5.6.7.8").await.unwrap();
    }

    #[tokio::test]
    async fn resolve_rejects_unknown_and_disabled() {
        let store = MockStore::new(1);
        let registry = Registry::new(&store, 1000);

        let err = registry.resolve("nope").await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownWorker));

        let id = registry.create_worker("9.9.9.9").await.unwrap();
        store.insert_worker(crate::models::Worker {
            disabled: true,
            ..store.worker(&id).unwrap()
        });
        let err = registry.resolve(&id).await.unwrap_err();
        assert!(matches!(err, CoreError::WorkerDisabled));
    }
}
