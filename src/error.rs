use crate::domain::ListingStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CurbsideError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Listing not found: {0}")]
    NotFound(Uuid),

    #[error("Listing {id} was already resolved as {status}")]
    AlreadyResolved { id: Uuid, status: ListingStatus },

    #[error("Listing {0} changed concurrently; someone else already resolved it")]
    Conflict(Uuid),

    #[error("Listing {0} has expired")]
    Expired(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0} has shut down")]
    ShutDown(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CurbsideError {
    /// Stable machine-readable code used in API error bodies and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            CurbsideError::Validation(_) => "validation_error",
            CurbsideError::NotFound(_) => "not_found",
            CurbsideError::AlreadyResolved { status: ListingStatus::Collected, .. } => {
                "already_claimed"
            }
            CurbsideError::AlreadyResolved { .. } => "already_resolved",
            CurbsideError::Conflict(_) => "conflict",
            CurbsideError::Expired(_) => "expired",
            CurbsideError::Forbidden(_) => "forbidden",
            CurbsideError::Storage(_) => "storage_error",
            CurbsideError::Config(_) => "config_error",
            CurbsideError::Timeout(_) => "timeout",
            CurbsideError::ShutDown(_) => "shut_down",
            CurbsideError::Http(_) => "http_error",
            CurbsideError::Json(_) => "json_error",
            CurbsideError::Toml(_) => "toml_error",
            CurbsideError::Io(_) => "io_error",
        }
    }

    /// Whether the caller may retry the same operation later.
    ///
    /// Claims are never retried blindly even when this returns true for a
    /// transport error; the client must re-read the listing first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CurbsideError::Storage(_) | CurbsideError::Timeout(_) | CurbsideError::Http(_)
        )
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CurbsideError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CurbsideError>;
