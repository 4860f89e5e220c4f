//! Error types for database operations

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum Error {
    /// SQLx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request rejected before reaching the database
    #[error("Invalid request: {0}")]
    Validation(#[from] reviewdesk_core::ValidationError),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored row could not be mapped to a request
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for reviewdesk_core::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound(what) => reviewdesk_core::Error::NotFound(what),
            Error::Validation(e) => reviewdesk_core::Error::Validation(e),
            other => reviewdesk_core::Error::Store(other.to_string()),
        }
    }
}
