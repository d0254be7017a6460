use crate::document::{Document, Filter, Query, Update};
use crate::error::StoreResult;

/// A forward-only stream of documents produced by a find.
///
/// Backends may fetch lazily; consumers must not assume the result set is
/// materialized.
pub type RawCursor = Box<dyn Iterator<Item = StoreResult<Document>> + Send>;

/// Collection-oriented document store.
///
/// All implementations must satisfy these invariants:
/// - Documents are keyed by their `_id` field, unique per collection.
/// - Each write is atomic for the one document it touches; nothing is
///   atomic across documents.
/// - A `find` whose filter is anchored on an `_id` prefix is served from
///   the primary-key ordering without a secondary index.
/// - No document is ever deleted individually. `clear` exists only for
///   schema resets.
/// - All I/O errors are propagated, never silently ignored.
pub trait DocumentStore: Send + Sync {
    /// Stream every document in `collection` matching the query.
    fn find(&self, collection: &str, query: &Query) -> StoreResult<RawCursor>;

    /// Number of documents matching `filter`, ignoring paging.
    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Insert-or-update the document with the given id.
    fn upsert(&self, collection: &str, id: &str, update: &Update) -> StoreResult<()>;

    /// Apply `update` to the existing document only if it matches `guard`.
    ///
    /// Returns `Ok(false)` if the document is missing or does not match.
    /// The check and the write happen atomically.
    fn update_if(
        &self,
        collection: &str,
        id: &str,
        guard: &Filter,
        update: &Update,
    ) -> StoreResult<bool>;

    /// Remove every document in `collection`.
    fn clear(&self, collection: &str) -> StoreResult<()>;

    /// First document matching `filter`, if any.
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let query = Query::new(filter.clone()).limit(1);
        self.find(collection, &query)?.next().transpose()
    }
}
