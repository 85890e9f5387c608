//! Community submission endpoints: filter, dedup, and stage new identifiers.
//! Not part of the worker/batch protocol, but shares the persistence gateway
//! and must parameterise every query — these endpoints are publicly
//! reachable with a CORS wildcard.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CoreResult;
use crate::store::{StagingTable, Store};

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());
static CHANNEL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^UC[A-Za-z0-9_-]{22}$").unwrap());

/// Filters `raw` down to well-formed, de-duplicated candidates (dedup within
/// the request itself, order-preserving), then delegates to the store for
/// dedup against the authoritative/staging tables and the actual insert.
pub async fn submit(
    store: &dyn Store,
    table: StagingTable,
    raw: Vec<String>,
) -> CoreResult<Vec<String>> {
    let pattern = match table {
        StagingTable::Videos => Some(&*VIDEO_ID),
        StagingTable::Channels => Some(&*CHANNEL_ID),
        StagingTable::Playlists => None,
    };

    let mut seen = HashSet::new();
    let candidates: Vec<String> = raw
        .into_iter()
        .filter(|id| pattern.map(|re| re.is_match(id)).unwrap_or(true))
        .filter(|id| seen.insert(id.clone()))
        .collect();

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    store.stage_submissions(table, &candidates).await
}
