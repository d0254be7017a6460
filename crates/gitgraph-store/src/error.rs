/// Errors from document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed to carry out the operation (lock poisoning,
    /// connection loss, rejected write).
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A filter pattern did not compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Stored data does not have the expected shape.
    #[error("corrupt collection {collection}: {reason}")]
    Corrupt { collection: String, reason: String },
}

impl StoreError {
    pub(crate) fn poisoned(e: impl std::fmt::Display) -> Self {
        Self::Backend(format!("lock poisoned: {e}"))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
