//! Read-only statistics surfaced at `/api/stats`.

use serde::Serialize;

use crate::models::{Stats, ESTIMATED_VIDEOS_PER_BATCH};

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub batch_count: i64,
    pub batch_finished: i64,
    pub batch_remaining: i64,
    pub content_size: i64,
    pub estimated_video_count: i64,
    pub estimated_video_finished: i64,
    pub estimated_video_remaining: i64,
    pub worker_count: i64,
    pub worker_active: i64,
}

impl From<Stats> for StatsResponse {
    fn from(stats: Stats) -> Self {
        let batch_remaining = stats.batch_count - stats.batch_finished;
        let estimated_video_count = stats.batch_count * ESTIMATED_VIDEOS_PER_BATCH;
        let estimated_video_finished = stats.batch_finished * ESTIMATED_VIDEOS_PER_BATCH;
        StatsResponse {
            batch_count: stats.batch_count,
            batch_finished: stats.batch_finished,
            batch_remaining,
            content_size: stats.content_size,
            estimated_video_count,
            estimated_video_finished,
            estimated_video_remaining: estimated_video_count - estimated_video_finished,
            worker_count: stats.worker_count,
            worker_active: stats.worker_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_remaining_counts() {
        let stats = Stats {
            batch_count: 10,
            batch_finished: 4,
            content_size: 1000,
            worker_count: 3,
            worker_active: 1,
        };
        let response = StatsResponse::from(stats);
        assert_eq!(response.batch_remaining, 6);
        assert_eq!(response.estimated_video_count, 100_000);
        assert_eq!(response.estimated_video_finished, 40_000);
        assert_eq!(response.estimated_video_remaining, 60_000);
    }
}
