//! The coordination protocol's error envelope.
//!
//! Every client-attributable failure maps to one of the numbered `error_code`s
//! from the external API; everything else collapses into `Internal`, which
//! never leaks its message to the client (see `tracing::error!` call sites).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("too many workers registered from this IP")]
    TooManyWorkers,

    #[error("unknown worker")]
    UnknownWorker,

    #[error("worker is disabled")]
    WorkerDisabled,

    #[error("worker must commit or finalize its current batch first")]
    MustCommitCurrent { batch_id: String },

    #[error("batch is not bound to this worker")]
    ForbiddenBatch,

    #[error("batch_id must not be empty")]
    EmptyBatchId,

    #[error("unknown batch")]
    UnknownBatch,

    #[error("reported content size does not match the authoritative size")]
    SizeMismatch { batch_id: String },

    #[error("no batches are available")]
    NoBatchesAvailable,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn error_code(&self) -> u32 {
        match self {
            CoreError::TooManyWorkers => 1,
            CoreError::UnknownWorker => 2,
            CoreError::WorkerDisabled => 3,
            CoreError::MustCommitCurrent { .. } => 4,
            CoreError::ForbiddenBatch => 5,
            CoreError::EmptyBatchId => 6,
            CoreError::UnknownBatch => 7,
            CoreError::SizeMismatch { .. } => 8,
            CoreError::NoBatchesAvailable | CoreError::Internal(_) => 500,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CoreError::NoBatchesAvailable | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::FORBIDDEN,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_id: Option<String>,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        if let CoreError::Internal(ref err) = self {
            tracing::error!(error = ?err, "internal error handling request");
        }

        let batch_id = match &self {
            CoreError::MustCommitCurrent { batch_id } => Some(batch_id.clone()),
            CoreError::SizeMismatch { batch_id } => Some(batch_id.clone()),
            _ => None,
        };

        let body = ErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
            batch_id,
        };

        (self.status(), Json(body)).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
