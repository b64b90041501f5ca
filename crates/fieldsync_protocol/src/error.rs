//! Codec errors.

use thiserror::Error;

/// Result type for protocol codecs.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The JSON payload could not be serialized or deserialized.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The message was structurally valid JSON but semantically malformed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl CodecError {
    /// Creates an invalid-message error.
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }
}
