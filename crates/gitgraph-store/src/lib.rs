//! Document storage for the git object graph index.
//!
//! The index persists every entity as a JSON document in a named
//! collection, keyed by the document's `_id`. This crate defines the
//! boundary the model layer talks to and the backends that implement it.
//!
//! # Operations
//!
//! All backends implement the [`DocumentStore`] trait:
//!
//! - `find` / `count` over a [`Filter`], with sort, skip and limit carried
//!   by a [`Query`]
//! - `upsert` of one document by id, driven by an [`Update`]
//!   (`set`, `set_on_insert`, `add_to_set`)
//! - `update_if`, a per-document compare-and-set
//! - `clear`, used only for schema resets
//!
//! # Backends
//!
//! - [`InMemoryDocumentStore`] -- ordered maps behind a lock; serves
//!   anchored `_id` prefix filters as range scans
//! - [`SnapshotStore`] -- the in-memory backend persisted to a JSON file
//!
//! # Design Rules
//!
//! 1. Every write is atomic per document and never across documents.
//! 2. The store never interprets documents beyond filter evaluation.
//! 3. There is no delete; `clear` drops a whole collection.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod document;
pub mod error;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use document::{compare_values, Document, Filter, Pattern, Query, Sort, SortOrder, Update, ID_FIELD};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryDocumentStore;
pub use snapshot::SnapshotStore;
pub use traits::{DocumentStore, RawCursor};
