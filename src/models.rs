//! Plain domain types shared by the `Store` trait, the dispatcher/verifier
//! logic, and the HTTP layer. Kept independent of `diesel`'s row types so the
//! core logic doesn't need to know which backend produced them.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Worker {
    pub id: String,
    pub ip: String,
    pub reputation: i64,
    pub disabled: bool,
    pub current_batch: Option<String>,
    pub last_committed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub id: String,
    pub start_ctid: String,
    pub end_ctid: String,
    pub finished: bool,
    pub content_size: Option<i64>,
    pub videos: Vec<String>,
    pub version: i64,
}

impl Batch {
    pub fn canonical_object_key(&self) -> String {
        format!("{}.json.gz", self.id)
    }

    pub fn versioned_object_key(&self, pre_increment_version: i64) -> String {
        format!("{}.json.gz-{}", self.id, pre_increment_version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub batch_count: i64,
    pub batch_finished: i64,
    pub content_size: i64,
    pub worker_count: i64,
    pub worker_active: i64,
}

/// Videos per batch, used only to compute the stats endpoint's estimated
/// video counts; the protocol never enumerates individual videos here.
pub const ESTIMATED_VIDEOS_PER_BATCH: i64 = 10_000;
