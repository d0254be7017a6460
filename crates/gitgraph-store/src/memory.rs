use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::document::{sort_cmp, Document, Filter, Query, SortOrder, Update, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::traits::{DocumentStore, RawCursor};

type Collection = BTreeMap<String, Document>;
type Collections = Arc<RwLock<HashMap<String, Collection>>>;

/// Documents an unsorted cursor clones out per lock acquisition.
const SCAN_BATCH: usize = 256;

/// In-memory document store.
///
/// Each collection is a `BTreeMap` ordered by `_id`, so filters anchored on
/// an `_id` prefix are answered by a range scan that starts at the prefix
/// and stops at the first key that no longer carries it. Everything else is
/// a full scan.
///
/// Unsorted finds stream: the cursor takes the read lock once per batch
/// and resumes after the last key it visited, so documents written behind
/// the cursor are not seen and documents written ahead of it are. Sorted
/// finds materialize the matching set to order it.
pub struct InMemoryDocumentStore {
    collections: Collections,
}

impl InMemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|map| map.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Returns `true` if no collection holds any document.
    pub fn is_empty(&self) -> bool {
        self.collections
            .read()
            .map(|map| map.values().all(BTreeMap::is_empty))
            .unwrap_or(true)
    }

    /// Sorted names of the collections that hold at least one document.
    pub fn collections(&self) -> Vec<String> {
        let Ok(map) = self.collections.read() else {
            return Vec::new();
        };
        let mut names: Vec<String> = map
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Copy of every collection, for persistence.
    pub fn export(&self) -> StoreResult<BTreeMap<String, Vec<Document>>> {
        let map = self.collections.read().map_err(StoreError::poisoned)?;
        Ok(map
            .iter()
            .map(|(name, docs)| (name.clone(), docs.values().cloned().collect()))
            .collect())
    }

    /// Replace the store contents with previously exported collections.
    pub fn import(&self, data: BTreeMap<String, Vec<Document>>) -> StoreResult<()> {
        let mut loaded = HashMap::with_capacity(data.len());
        for (name, docs) in data {
            let mut collection = Collection::new();
            for doc in docs {
                let id = doc
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .ok_or_else(|| StoreError::Corrupt {
                        collection: name.clone(),
                        reason: "document without string _id".into(),
                    })?
                    .to_string();
                collection.insert(id, doc);
            }
            loaded.insert(name, collection);
        }
        *self.collections.write().map_err(StoreError::poisoned)? = loaded;
        Ok(())
    }
}

/// Documents of `collection` that can match `filter`, in `_id` order,
/// starting strictly after `after` when given.
///
/// Narrows the scan using an exact or prefix `_id` constraint when the
/// filter carries one; the caller still applies the full filter.
fn candidates<'a>(
    collection: &'a Collection,
    filter: &'a Filter,
    after: Option<&'a str>,
) -> Box<dyn Iterator<Item = (&'a String, &'a Document)> + 'a> {
    if let Some(id) = filter.id_exact() {
        let hit = collection
            .get_key_value(id)
            .filter(move |(key, _)| after.map_or(true, |after| key.as_str() > after));
        return Box::new(hit.into_iter());
    }
    let prefix = filter.id_prefix().unwrap_or("");
    let start = match after {
        Some(after) if after >= prefix => Bound::Excluded(after),
        _ if prefix.is_empty() => Bound::Unbounded,
        _ => Bound::Included(prefix),
    };
    let range = collection
        .range::<str, _>((start, Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(prefix));
    Box::new(range)
}

/// Streams an unsorted find in `_id` order.
struct ScanCursor {
    collections: Collections,
    collection: String,
    filter: Filter,
    after: Option<String>,
    skip: usize,
    remaining: usize,
    buffer: VecDeque<Document>,
    exhausted: bool,
}

impl ScanCursor {
    fn fill(&mut self) -> StoreResult<()> {
        let map = self.collections.read().map_err(StoreError::poisoned)?;
        let Some(docs) = map.get(&self.collection) else {
            self.exhausted = true;
            return Ok(());
        };
        let want = SCAN_BATCH.min(self.remaining);
        let resume = self.after.take();
        let mut last = None;
        let mut full = false;
        for (key, doc) in candidates(docs, &self.filter, resume.as_deref()) {
            last = Some(key);
            if !self.filter.matches(doc) {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            self.buffer.push_back(doc.clone());
            if self.buffer.len() >= want {
                full = true;
                break;
            }
        }
        self.after = last.cloned().or(resume);
        self.exhausted = !full;
        Ok(())
    }
}

impl Iterator for ScanCursor {
    type Item = StoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        let doc = self.buffer.pop_front()?;
        self.remaining -= 1;
        Some(Ok(doc))
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn find(&self, collection: &str, query: &Query) -> StoreResult<RawCursor> {
        let limit = query.limit.unwrap_or(usize::MAX);
        let Some(sort) = &query.sort else {
            return Ok(Box::new(ScanCursor {
                collections: Arc::clone(&self.collections),
                collection: collection.to_string(),
                filter: query.filter.clone(),
                after: None,
                skip: query.skip,
                remaining: limit,
                buffer: VecDeque::new(),
                exhausted: false,
            }));
        };

        let map = self.collections.read().map_err(StoreError::poisoned)?;
        let Some(docs) = map.get(collection) else {
            return Ok(Box::new(std::iter::empty::<StoreResult<Document>>()));
        };
        let mut all: Vec<&Document> = candidates(docs, &query.filter, None)
            .map(|(_, doc)| doc)
            .filter(|doc| query.filter.matches(doc))
            .collect();
        all.sort_by(|a, b| {
            let ord = sort_cmp(a.get(&sort.field), b.get(&sort.field));
            match sort.order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
        let page: Vec<Document> = all.into_iter().skip(query.skip).take(limit).cloned().collect();
        Ok(Box::new(page.into_iter().map(Ok::<_, StoreError>)))
    }

    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let map = self.collections.read().map_err(StoreError::poisoned)?;
        Ok(map.get(collection).map_or(0, |docs| {
            candidates(docs, filter, None)
                .filter(|(_, doc)| filter.matches(doc))
                .count() as u64
        }))
    }

    fn upsert(&self, collection: &str, id: &str, update: &Update) -> StoreResult<()> {
        let mut map = self.collections.write().map_err(StoreError::poisoned)?;
        let docs = map.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(doc) => update.apply(doc, false),
            None => {
                let mut doc = Document::new();
                doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                update.apply(&mut doc, true);
                docs.insert(id.to_string(), doc);
            }
        }
        Ok(())
    }

    fn update_if(
        &self,
        collection: &str,
        id: &str,
        guard: &Filter,
        update: &Update,
    ) -> StoreResult<bool> {
        let mut map = self.collections.write().map_err(StoreError::poisoned)?;
        let Some(doc) = map.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Ok(false);
        };
        if !guard.matches(doc) {
            return Ok(false);
        }
        update.apply(doc, false);
        Ok(true)
    }

    fn clear(&self, collection: &str) -> StoreResult<()> {
        let mut map = self.collections.write().map_err(StoreError::poisoned)?;
        map.remove(collection);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: BTreeMap<String, usize> = self
            .collections
            .read()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.len())).collect())
            .unwrap_or_default();
        f.debug_struct("InMemoryDocumentStore")
            .field("collections", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed(store: &InMemoryDocumentStore, collection: &str, id: &str, fields: Value) {
        let mut update = Update::new();
        if let Value::Object(map) = fields {
            update.set = map;
        }
        store.upsert(collection, id, &update).unwrap();
    }

    fn ids(cursor: RawCursor) -> Vec<String> {
        cursor
            .map(|doc| doc.unwrap()[ID_FIELD].as_str().unwrap().to_string())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Upsert
    // -----------------------------------------------------------------------

    #[test]
    fn upsert_inserts_with_id() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "blobs", "a1", json!({"dirty": false}));

        let doc = store.find_one("blobs", &Filter::id("a1")).unwrap().unwrap();
        assert_eq!(doc[ID_FIELD], json!("a1"));
        assert_eq!(doc["dirty"], json!(false));
        assert_eq!(store.len("blobs"), 1);
    }

    #[test]
    fn upsert_updates_existing() {
        let store = InMemoryDocumentStore::new();
        let insert = Update::new().set_on_insert("__type__", "blob").set("dirty", true);
        store.upsert("blobs", "a1", &insert).unwrap();
        let change = Update::new().set_on_insert("__type__", "tree").set("dirty", false);
        store.upsert("blobs", "a1", &change).unwrap();

        let doc = store.find_one("blobs", &Filter::id("a1")).unwrap().unwrap();
        assert_eq!(doc["__type__"], json!("blob"));
        assert_eq!(doc["dirty"], json!(false));
        assert_eq!(store.len("blobs"), 1);
    }

    #[test]
    fn repeated_add_to_set_is_idempotent() {
        let store = InMemoryDocumentStore::new();
        let update = Update::new().add_to_set("labels", vec![json!("file.py")]);
        store.upsert("edges", "e1", &update).unwrap();
        store.upsert("edges", "e1", &update).unwrap();

        let doc = store.find_one("edges", &Filter::id("e1")).unwrap().unwrap();
        assert_eq!(doc["labels"], json!(["file.py"]));
        assert_eq!(store.len("edges"), 1);
    }

    // -----------------------------------------------------------------------
    // Find
    // -----------------------------------------------------------------------

    #[test]
    fn find_missing_collection_is_empty() {
        let store = InMemoryDocumentStore::new();
        let cursor = store.find("nothing", &Query::new(Filter::All)).unwrap();
        assert_eq!(cursor.count(), 0);
        assert_eq!(store.count("nothing", &Filter::All).unwrap(), 0);
    }

    #[test]
    fn prefix_find_uses_id_order() {
        let store = InMemoryDocumentStore::new();
        for id in ["abc2", "abd0", "abc1", "zzz", "ab"] {
            seed(&store, "c", id, json!({}));
        }
        let query = Query::new(Filter::prefix(ID_FIELD, "abc").unwrap());
        assert_eq!(ids(store.find("c", &query).unwrap()), vec!["abc1", "abc2"]);
        assert_eq!(store.count("c", &query.filter).unwrap(), 2);
    }

    #[test]
    fn prefix_find_combines_with_other_filters() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "c", "aa1", json!({"ok": true}));
        seed(&store, "c", "aa2", json!({"ok": false}));
        let filter = Filter::prefix(ID_FIELD, "aa").unwrap().and(Filter::eq("ok", true));
        assert_eq!(ids(store.find("c", &Query::new(filter)).unwrap()), vec!["aa1"]);
    }

    #[test]
    fn skip_and_limit_page_results() {
        let store = InMemoryDocumentStore::new();
        for i in 0..10 {
            seed(&store, "c", &format!("id{i}"), json!({}));
        }
        let query = Query::new(Filter::All).skip(3).limit(4);
        assert_eq!(
            ids(store.find("c", &query).unwrap()),
            vec!["id3", "id4", "id5", "id6"]
        );
        // Count ignores paging.
        assert_eq!(store.count("c", &query.filter).unwrap(), 10);
    }

    #[test]
    fn unsorted_find_streams_in_batches() {
        let store = InMemoryDocumentStore::new();
        let total = SCAN_BATCH * 2 + 10;
        for i in 0..total {
            seed(&store, "c", &format!("k{i:05}"), json!({}));
        }
        let mut cursor = store.find("c", &Query::new(Filter::All)).unwrap();
        let first = cursor.next().unwrap().unwrap();
        assert_eq!(first[ID_FIELD], json!("k00000"));

        // The lock is not held between batches, and writes ahead of the
        // cursor show up in later ones.
        seed(&store, "c", "k99999", json!({}));
        seed(&store, "c", "a-behind", json!({}));
        let rest = ids(cursor);
        assert_eq!(rest.len(), total);
        assert_eq!(rest.last().map(String::as_str), Some("k99999"));
        assert!(!rest.iter().any(|id| id == "a-behind"));
    }

    #[test]
    fn streamed_prefix_find_pages_across_batches() {
        let store = InMemoryDocumentStore::new();
        for i in 0..SCAN_BATCH * 3 {
            seed(&store, "c", &format!("ab{i:05}"), json!({"even": i % 2 == 0}));
            seed(&store, "c", &format!("zz{i:05}"), json!({"even": true}));
        }
        let filter = Filter::prefix(ID_FIELD, "ab").unwrap().and(Filter::eq("even", true));
        let query = Query::new(filter).skip(5).limit(SCAN_BATCH + 3);
        let found = ids(store.find("c", &query).unwrap());
        assert_eq!(found.len(), SCAN_BATCH + 3);
        assert_eq!(found[0], "ab00010");
        assert!(found.iter().all(|id| id.starts_with("ab")));
    }

    #[test]
    fn sort_descending_by_field() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "repos", "r1", json!({"count": 5}));
        seed(&store, "repos", "r2", json!({"count": 50}));
        seed(&store, "repos", "r3", json!({"count": 1}));
        seed(&store, "repos", "r4", json!({}));

        let query = Query::new(Filter::All).sort_by("count", SortOrder::Descending).limit(2);
        assert_eq!(ids(store.find("repos", &query).unwrap()), vec!["r2", "r1"]);

        let query = Query::new(Filter::All).sort_by("count", SortOrder::Ascending);
        assert_eq!(
            ids(store.find("repos", &query).unwrap()),
            vec!["r4", "r3", "r1", "r2"]
        );
    }

    #[test]
    fn contains_filter_scans_arrays() {
        let store = InMemoryDocumentStore::new();
        store
            .upsert("blobs", "b1", &Update::new().add_to_set("repository_ids", vec![json!("r1")]))
            .unwrap();
        store
            .upsert("blobs", "b2", &Update::new().add_to_set("repository_ids", vec![json!("r2")]))
            .unwrap();
        let filter = Filter::contains("repository_ids", "r1");
        assert_eq!(store.count("blobs", &filter).unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Conditional update
    // -----------------------------------------------------------------------

    #[test]
    fn update_if_applies_only_when_guard_matches() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "repos", "r1", json!({"indexing": false}));
        let guard = Filter::eq("indexing", false);
        let claim = Update::new().set("indexing", true);

        assert!(store.update_if("repos", "r1", &guard, &claim).unwrap());
        assert!(!store.update_if("repos", "r1", &guard, &claim).unwrap());
        assert!(!store.update_if("repos", "missing", &guard, &claim).unwrap());
    }

    // -----------------------------------------------------------------------
    // Clear / export / import
    // -----------------------------------------------------------------------

    #[test]
    fn clear_drops_collection_only() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "a", "1", json!({}));
        seed(&store, "b", "1", json!({}));
        store.clear("a").unwrap();
        assert_eq!(store.len("a"), 0);
        assert_eq!(store.len("b"), 1);
        assert_eq!(store.collections(), vec!["b".to_string()]);
    }

    #[test]
    fn export_import_preserves_documents() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "a", "1", json!({"x": 1}));
        seed(&store, "a", "2", json!({"x": 2}));
        let data = store.export().unwrap();

        let other = InMemoryDocumentStore::new();
        other.import(data).unwrap();
        assert_eq!(other.len("a"), 2);
        let doc = other.find_one("a", &Filter::id("2")).unwrap().unwrap();
        assert_eq!(doc["x"], json!(2));
    }

    #[test]
    fn import_rejects_documents_without_id() {
        let store = InMemoryDocumentStore::new();
        let mut data = BTreeMap::new();
        data.insert("a".to_string(), vec![Document::new()]);
        assert!(matches!(
            store.import(data),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn concurrent_upserts_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryDocumentStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let update = Update::new().add_to_set("members", vec![json!(i)]);
                    store.upsert("c", "shared", &update).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        let doc = store.find_one("c", &Filter::id("shared")).unwrap().unwrap();
        assert_eq!(doc["members"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "blobs", "x", json!({}));
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryDocumentStore"));
        assert!(debug.contains("blobs"));
    }
}
