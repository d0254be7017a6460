//! Identifier types for the git object graph index.
//!
//! Every record the index stores is keyed by one of three identifiers:
//!
//! - [`ObjectId`] -- the 40-character lowercase hex SHA1 of a git blob,
//!   tree, commit or tag
//! - [`RepositoryId`] -- an opaque repository key, the SHA1 hex of the
//!   repository URL
//! - [`EdgeId`] -- the 80-character concatenation of two object ids, the
//!   primary key of an association record
//!
//! Edge ids are decomposed by fixed-offset slicing, so a prefix scan over
//! edge ids anchored at a source object id enumerates every edge leaving
//! that object.

pub mod edge;
pub mod error;
pub mod id;

pub use edge::{EdgeId, EDGE_ID_LEN};
pub use error::TypeError;
pub use id::{ObjectId, RepositoryId, OBJECT_ID_LEN};
