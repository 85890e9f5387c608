//! JSON request/response shapes for the external API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct WorkerIdentified {
    pub worker_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub worker_id: String,
    pub batch_id: String,
    pub content_size: i64,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub worker_id: String,
    pub batch_id: String,
}

#[derive(Debug, Serialize)]
pub struct WorkerCreatedResponse {
    pub worker_id: String,
    pub s3_url: String,
}

#[derive(Debug, Serialize)]
pub struct WorkersResponse {
    pub workers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch_id: String,
    pub objects: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub upload_url: String,
}

#[derive(Debug, Deserialize)]
pub struct VideoSubmitRequest {
    pub videos: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistSubmitRequest {
    pub playlists: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelSubmitRequest {
    pub channels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InsertedResponse {
    pub inserted: Vec<String>,
}
