//! Error-to-status translation at the RPC boundary.
//!
//! Handlers return engine errors unchanged; this module folds them onto
//! the status table when a response is built, and recovers a status from
//! a bare HTTP code on the client side when a peer omits the body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use tickrig_core::{Error, RpcStatus};

/// Error body sent for every failed RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    /// Status code for programmatic handling.
    pub status: RpcStatus,
    /// Human-readable error detail.
    pub detail: String,
}

/// Engine error crossing the RPC boundary.
#[derive(Debug)]
pub struct RpcError(pub Error);

/// HTTP code carrying each RPC status.
pub fn http_status(status: RpcStatus) -> StatusCode {
    match status {
        RpcStatus::NotFound => StatusCode::NOT_FOUND,
        RpcStatus::InvalidArgument => StatusCode::BAD_REQUEST,
        RpcStatus::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        RpcStatus::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        RpcStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Status recovered from a bare HTTP code, for responses without a body.
pub fn status_for_http(code: StatusCode) -> RpcStatus {
    match code {
        StatusCode::NOT_FOUND => RpcStatus::NotFound,
        StatusCode::BAD_REQUEST => RpcStatus::InvalidArgument,
        StatusCode::PRECONDITION_FAILED => RpcStatus::FailedPrecondition,
        StatusCode::SERVICE_UNAVAILABLE => RpcStatus::Unavailable,
        _ => RpcStatus::Internal,
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        RpcError(err)
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.0.rpc_status();

        // The wire only carries the folded status; keep the full error in
        // the server logs before it is lost.
        match status {
            RpcStatus::Internal => {
                tracing::error!(status = %status, error = %self.0, "RPC call failed");
            }
            _ => {
                tracing::warn!(status = %status, error = %self.0, "RPC call rejected");
            }
        }

        let body = StatusBody {
            status,
            detail: self.0.to_string(),
        };

        (http_status(status), Json(body)).into_response()
    }
}

/// Result type for RPC handlers.
pub type RpcResult<T> = std::result::Result<T, RpcError>;
