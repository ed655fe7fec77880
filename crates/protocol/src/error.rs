//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding or encoding agent messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Message is not valid UTF-8")]
    InvalidUtf8,

    #[error("Empty message")]
    Empty,
}
