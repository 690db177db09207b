//! Error types for the tickrig engine.

use thiserror::Error;

/// Status codes carried across the agent RPC boundary.
///
/// Engine errors are folded into one of these before they leave the
/// process; the full error detail only ever appears in the server logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcStatus {
    NotFound,
    InvalidArgument,
    FailedPrecondition,
    Internal,
    Unavailable,
}

impl std::fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RpcStatus::NotFound => "NOT_FOUND",
            RpcStatus::InvalidArgument => "INVALID_ARGUMENT",
            RpcStatus::FailedPrecondition => "FAILED_PRECONDITION",
            RpcStatus::Internal => "INTERNAL",
            RpcStatus::Unavailable => "UNAVAILABLE",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("remote call failed with {status}: {detail}")]
    RemoteStatus { status: RpcStatus, detail: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Map this error onto the RPC status table.
    ///
    /// NotFound → NOT_FOUND, bad arguments → INVALID_ARGUMENT, validation
    /// and state violations → FAILED_PRECONDITION, everything else →
    /// INTERNAL.
    pub fn rpc_status(&self) -> RpcStatus {
        match self {
            Error::NotFound(_) => RpcStatus::NotFound,
            Error::IllegalArgument(_) => RpcStatus::InvalidArgument,
            Error::ValidationFailed(_) => RpcStatus::FailedPrecondition,
            Error::IllegalState(_) => RpcStatus::FailedPrecondition,
            Error::RemoteStatus { status, .. } => *status,
            _ => RpcStatus::Internal,
        }
    }

    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Error::IllegalArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Error::IllegalState(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::ValidationFailed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
