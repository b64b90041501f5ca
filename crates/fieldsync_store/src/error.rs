//! Error types for the local store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the local store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Filesystem error in the attachment file store.
    #[error("file store error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored identifier or timestamp could not be parsed.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// An attachment path escaped the file store root or was empty.
    #[error("invalid attachment path: {0}")]
    InvalidPath(String),

    /// The value transform rejected a payload.
    #[error("value transform error: {0}")]
    Transform(String),
}

impl StoreError {
    /// Creates a corrupt-row error.
    pub fn corrupt_row(message: impl Into<String>) -> Self {
        Self::CorruptRow(message.into())
    }
}
