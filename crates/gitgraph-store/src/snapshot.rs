//! File-backed store: the in-memory backend plus a JSON snapshot.
//!
//! The snapshot is loaded once on [`SnapshotStore::open`] and written back
//! only when [`SnapshotStore::persist`] is called. Writes go to a temp file
//! in the same directory which is then renamed over the snapshot, so a
//! crash mid-write leaves the previous snapshot intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::document::{Document, Filter, Query, Update};
use crate::error::StoreResult;
use crate::memory::InMemoryDocumentStore;
use crate::traits::{DocumentStore, RawCursor};

/// A document store persisted as a single JSON file.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    inner: InMemoryDocumentStore,
}

impl SnapshotStore {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = InMemoryDocumentStore::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let data: BTreeMap<String, Vec<Document>> = serde_json::from_str(&raw)?;
            inner.import(data)?;
            debug!(path = %path.display(), collections = inner.collections().len(), "snapshot loaded");
        }
        Ok(Self { path, inner })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The backing in-memory store.
    pub fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    /// Atomically write the current contents to the snapshot file.
    pub fn persist(&self) -> StoreResult<()> {
        let data = self.inner.export()?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, &data)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), collections = data.len(), "snapshot persisted");
        Ok(())
    }
}

impl DocumentStore for SnapshotStore {
    fn find(&self, collection: &str, query: &Query) -> StoreResult<RawCursor> {
        self.inner.find(collection, query)
    }

    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.inner.count(collection, filter)
    }

    fn upsert(&self, collection: &str, id: &str, update: &Update) -> StoreResult<()> {
        self.inner.upsert(collection, id, update)
    }

    fn update_if(
        &self,
        collection: &str,
        id: &str,
        guard: &Filter,
        update: &Update,
    ) -> StoreResult<bool> {
        self.inner.update_if(collection, id, guard, update)
    }

    fn clear(&self, collection: &str) -> StoreResult<()> {
        self.inner.clear(collection)
    }
}
