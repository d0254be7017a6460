//! Entity model for the git object graph index.
//!
//! Blobs, trees, commits, tags and repositories are typed entities that
//! track their own field changes. A [`Session`] owns the identity cache
//! and the per-kind pending-write buffers, and turns accumulated changes
//! into one partial upsert per entity when it flushes.
//!
//! # Edges
//!
//! Structure is never embedded in object documents. Every relationship
//! (blob in tree, tree in tree, root tree of commit, parent commit, tag
//! targets, submodules) is its own [`Association`] record in a
//! per-relation collection, keyed by the 80-character concatenation of
//! the two object ids. Outgoing edges are an anchored prefix scan on that
//! key; incoming edges are an equality match on the stored `key2`.
//!
//! # Design Rules
//!
//! 1. Readers see the store only. Pending writes are visible through
//!    `get`/`get_or_create` on the same session and nowhere else.
//! 2. A flush writes each pending entity once and clears the identity
//!    cache of every class it completes.
//! 3. A failed upsert aborts the flush; that write and all later ones stay
//!    pending.
//! 4. Unknown discriminators are errors, never a generic fallback.

pub mod association;
pub mod canonical;
pub mod config;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod field;
pub mod object;
pub mod repository;
pub mod session;
pub mod transform;

pub use association::{Association, EdgeCursor, Relation};
pub use canonical::{canonicalize, IdRef};
pub use config::{ModelConfig, DEFAULT_TRANSACTION_WINDOW};
pub use cursor::{LazyCursor, Page};
pub use entity::{Entity, EntityKind, EntityState, Identified, ObjectKind, DISCRIMINATOR_FIELD};
pub use error::{ModelError, ModelResult};
pub use field::{Changes, FieldOp, FieldValue, Scalar, SetField};
pub use object::{
    AnyObject, Blob, Commit, GitObject, HasChildren, HasParents, HasRepositories, ObjectType, Tag,
    Tree,
};
pub use repository::Repository;
pub use session::Session;
pub use transform::{demarshal, marshal, Record};
