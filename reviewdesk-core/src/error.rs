//! Error types for ReviewDesk

use thiserror::Error;

use crate::request::ValidationError;

/// Result type alias for ReviewDesk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ReviewDesk operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request failed validation before reaching the store
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// No owner is signed in
    #[error("No active session")]
    NoSession,

    /// Conditional write matched no row owned by the caller
    #[error("Request {0} is not owned by the current session")]
    Unauthorized(String),

    /// Record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Remote call did not finish in time
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The session owner changed while the call was waiting
    #[error("Session changed to another owner")]
    SessionChanged,

    /// Synchronizer task is no longer running
    #[error("Synchronizer has shut down")]
    Closed,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
