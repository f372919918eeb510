//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use solramp::{RampError, StoreError};
use solramp_svm::executor::{SwapError, TransferError};
use tracing::warn;

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Domain error from validation, upstreams or submission.
    #[error(transparent)]
    Ramp(#[from] RampError),

    /// Session store rejection (missing, duplicate or claimed session).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Direct transfer failure, carrying retry signalling.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Swap pipeline failure, carrying already-broadcast transactions.
    #[error("{}", .0.source)]
    Swap(#[from] SwapError),
}

fn ramp_status(error: &RampError) -> StatusCode {
    match error {
        RampError::Validation(_) => StatusCode::BAD_REQUEST,
        RampError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        RampError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RampError::OnChainSubmission { .. } => StatusCode::BAD_GATEWAY,
        RampError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Ramp(error) => (
                ramp_status(error),
                json!({ "error": error.to_string() }),
            ),
            Self::Store(error) => {
                let status = match error {
                    StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    StoreError::DuplicateId(_)
                    | StoreError::AlreadyClaimed(_)
                    | StoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
                };
                (status, json!({ "error": error.to_string() }))
            }
            Self::Transfer(error) => (
                ramp_status(&error.source),
                json!({
                    "error": error.source.to_string(),
                    "retryScheduled": error.retry_scheduled,
                    "retryCount": error.retry_count,
                }),
            ),
            Self::Swap(error) => (
                ramp_status(&error.source),
                json!({
                    "error": error.source.to_string(),
                    "transactions": error.transactions,
                }),
            ),
        };
        if status.is_server_error() {
            warn!(%status, error = %self, "request failed");
        }
        (status, Json(body)).into_response()
    }
}
