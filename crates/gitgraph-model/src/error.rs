use gitgraph_store::StoreError;
use gitgraph_types::TypeError;
use thiserror::Error;

/// Errors produced by the entity model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A unique lookup matched no record.
    #[error("{collection}: no record with id {id}")]
    NotFound { collection: String, id: String },

    /// A unique lookup matched more than one record. Ids are unique by
    /// construction, so this always means the store is corrupted.
    #[error("{collection}: id {id} matched {matches} records")]
    Conflict {
        collection: String,
        id: String,
        matches: u64,
    },

    /// A stored record or composite id does not have the required shape.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A value could not be interpreted as an id or entity reference.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// An upsert failed during flush. Writes not yet applied stay pending.
    #[error("upsert of {collection}/{id} failed: {source}")]
    StorageOperation {
        collection: String,
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid id: {0}")]
    Type(#[from] TypeError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ModelError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Malformed records and malformed ids both count as validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Type(_))
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
