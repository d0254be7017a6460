use thiserror::Error;

/// Errors produced by identifier parsing and composition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid id length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("object id must be lowercase hex: {0}")]
    NotLowercase(String),
}
