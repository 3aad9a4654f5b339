//! Operation error types

use thiserror::Error;

/// Errors that can occur while decoding or encoding edit operations
#[derive(Error, Debug)]
pub enum OtError {
    /// The payload looked structured but did not decode as an operation
    #[error("Malformed operation: {0}")]
    Malformed(String),

    /// Insert operations must carry at least one character
    #[error("Insert operation carries no text")]
    EmptyInsert,

    /// Operation could not be serialized
    #[error("Failed to encode operation: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for OtError {
    fn from(err: serde_json::Error) -> Self {
        OtError::Malformed(err.to_string())
    }
}

/// Result type alias for operation handling
pub type OtResult<T> = Result<T, OtError>;
