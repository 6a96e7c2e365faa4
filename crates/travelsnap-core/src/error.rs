//! Error types for travelsnap-core

use thiserror::Error;

use crate::auth::AuthError;

/// Result type alias using travelsnap-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in travelsnap-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Identity service or session persistence error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document store error, carrying the service's own message
    #[error("Document store error: {0}")]
    Store(String),

    /// Media/object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A write precondition failed (document exists, or changed since it was read)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller is not allowed to perform the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
