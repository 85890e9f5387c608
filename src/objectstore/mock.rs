//! In-memory fake used by commit/finalize unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CoreError, CoreResult};

use super::ObjectStore;

#[derive(Default)]
pub struct MockObjectStore {
    sizes: Mutex<HashMap<String, i64>>,
    presign_calls: Mutex<Vec<(String, i64)>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the size the fake HEAD call should return for `object_key`,
    /// simulating a worker having already uploaded the canonical object.
    pub fn seed_object(&self, object_key: impl Into<String>, size: i64) {
        self.sizes.lock().unwrap().insert(object_key.into(), size);
    }

    pub fn presign_calls(&self) -> Vec<(String, i64)> {
        self.presign_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn presign_put(&self, object_key: &str, content_length: i64) -> CoreResult<String> {
        self.presign_calls
            .lock()
            .unwrap()
            .push((object_key.to_string(), content_length));
        Ok(format!("https://mock-bucket.test/{object_key}?signed=1"))
    }

    async fn head_size(&self, object_key: &str) -> CoreResult<i64> {
        self.sizes
            .lock()
            .unwrap()
            .get(object_key)
            .copied()
            .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("object {object_key} not found")))
    }
}
