//! The unit of work: identity cache, pending-write buffers and flush.
//!
//! A [`Session`] is constructed once over a shared [`DocumentStore`] and
//! passed to everything that reads or writes entities. It is not
//! internally synchronized; concurrent crawlers each get their own
//! session and interleave only at the per-document atomicity of the
//! store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gitgraph_store::{Document, DocumentStore, Filter, Query, StoreResult, Update, ID_FIELD};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::ModelConfig;
use crate::cursor::LazyCursor;
use crate::entity::{Entity, EntityKind, DISCRIMINATOR_FIELD};
use crate::error::{ModelError, ModelResult};
use crate::field::{Changes, FieldOp};
use crate::transform;

/// A buffered write for one entity.
#[derive(Debug)]
struct PendingWrite {
    id: String,
    new: bool,
    /// Declared fields as of the latest save.
    fields: Document,
    changes: Changes,
}

impl PendingWrite {
    /// The upsert that applies this write.
    ///
    /// The discriminator, and for first-time records every field the
    /// caller never touched, go into `set_on_insert`, so writing a stub
    /// for an id that is already stored never clobbers what is there.
    fn to_update(&self, kind: EntityKind) -> Update {
        let mut update = Update::new().set_on_insert(DISCRIMINATOR_FIELD, kind.discriminator());
        if self.new {
            for (field, value) in &self.fields {
                if !self.changes.touches(field) {
                    update.set_on_insert.insert(field.clone(), value.clone());
                }
            }
        }
        for (field, op) in self.changes.iter() {
            match op {
                FieldOp::Set(value) => {
                    update.set.insert(field.to_string(), value.clone());
                }
                FieldOp::AddToSet(values) => {
                    update.add_to_set.insert(field.to_string(), values.clone());
                }
            }
        }
        update
    }
}

/// Per-kind identity cache and pending list.
#[derive(Debug, Default)]
struct ClassBuffer {
    cache: HashMap<String, Document>,
    pending: Vec<PendingWrite>,
    index: HashMap<String, usize>,
}

impl ClassBuffer {
    fn requeue(&mut self, writes: Vec<PendingWrite>) {
        self.index = writes
            .iter()
            .enumerate()
            .map(|(i, write)| (write.id.clone(), i))
            .collect();
        self.pending = writes;
    }
}

/// Identity cache, pending buffers and the transaction window.
pub struct Session {
    store: Arc<dyn DocumentStore>,
    config: ModelConfig,
    buffers: HashMap<EntityKind, ClassBuffer>,
    pending: usize,
}

impl Session {
    /// A session with the default configuration.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            config: ModelConfig::default(),
            buffers: HashMap::new(),
            pending: 0,
        }
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: ModelConfig) -> ModelResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(store)
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    // ---- Reads ----

    /// Load one entity by id, from the identity cache if possible.
    ///
    /// On a cache miss the stored record is read and any write still
    /// pending for the id is applied on top of it.
    pub fn get<E: Entity>(&mut self, kind: EntityKind, id: &str) -> ModelResult<E> {
        let collection = kind.collection();
        if let Some(doc) = self.buffers.get(&kind).and_then(|b| b.cache.get(id)) {
            debug!(collection, id, "cache hit");
            return transform::decode_as(kind, doc);
        }

        let query = Query::new(Filter::id(id)).limit(2);
        let mut matches = self
            .store
            .find(collection, &query)?
            .collect::<StoreResult<Vec<Document>>>()?;
        if matches.len() > 1 {
            let total = self.store.count(collection, &Filter::id(id))?;
            error!(collection, id, matches = total, "duplicate records for unique id");
            return Err(ModelError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
                matches: total,
            });
        }
        let doc = match (matches.pop(), self.pending_update(kind, id)) {
            (Some(doc), None) => doc,
            (Some(mut doc), Some(update)) => {
                update.apply(&mut doc, false);
                doc
            }
            (None, Some(update)) => {
                let mut doc = Document::new();
                doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                update.apply(&mut doc, true);
                doc
            }
            (None, None) => {
                return Err(ModelError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })
            }
        };

        let entity = transform::decode_as(kind, &doc)?;
        self.buffers
            .entry(kind)
            .or_default()
            .cache
            .insert(id.to_string(), doc);
        Ok(entity)
    }

    /// The entity as [`get`](Self::get) sees it, or an unsaved stub
    /// carrying only `id` when nothing is cached, pending or stored.
    pub fn get_or_create<E: Entity>(&mut self, kind: EntityKind, id: &str) -> ModelResult<E> {
        match self.get(kind, id) {
            Err(e) if e.is_not_found() => E::stub(kind, id),
            other => other,
        }
    }

    fn pending_update(&self, kind: EntityKind, id: &str) -> Option<Update> {
        let buffer = self.buffers.get(&kind)?;
        let &i = buffer.index.get(id)?;
        Some(buffer.pending[i].to_update(kind))
    }

    /// Stream stored entities of `kind` matching `query`.
    ///
    /// Reads go straight to the store: writes still pending in this
    /// session are not visible until flushed.
    pub fn find<E: Entity>(&self, kind: EntityKind, query: &Query) -> ModelResult<LazyCursor<E>> {
        let raw = self.store.find(kind.collection(), query)?;
        Ok(LazyCursor::new(raw, move |doc| transform::decode_as(kind, &doc)))
    }

    /// Number of stored records of `kind` matching `filter`.
    pub fn count_matching(&self, kind: EntityKind, filter: &Filter) -> ModelResult<u64> {
        Ok(self.store.count(kind.collection(), filter)?)
    }

    /// Number of stored records of `kind`.
    pub fn count(&self, kind: EntityKind) -> ModelResult<u64> {
        self.count_matching(kind, &Filter::All)
    }

    /// Whether `id` is known to this session or stored.
    pub fn exists(&self, kind: EntityKind, id: &str) -> ModelResult<bool> {
        if self
            .buffers
            .get(&kind)
            .is_some_and(|b| b.cache.contains_key(id) || b.index.contains_key(id))
        {
            return Ok(true);
        }
        Ok(self.count_matching(kind, &Filter::id(id))? > 0)
    }

    // ---- Writes ----

    /// Queue the entity's changes for the next flush.
    ///
    /// Saving an unchanged, already stored entity does nothing. Otherwise
    /// the change document moves into the session, leaving the caller's
    /// copy clean; saving the same id again before a flush merges into the
    /// existing pending write. Once more distinct entities are pending
    /// than the transaction window allows, the session flushes before
    /// returning.
    pub fn save<E: Entity>(&mut self, entity: &mut E) -> ModelResult<()> {
        if !entity.state().is_changed() {
            return Ok(());
        }
        let kind = entity.kind();
        let id = entity.id_str().to_string();
        let fields = entity.fields();
        let (new, changes) = entity.state_mut().take();

        let buffer = self.buffers.entry(kind).or_default();
        // A stub's defaults say nothing about what is stored.
        if new {
            buffer.cache.remove(&id);
        } else {
            buffer.cache.insert(id.clone(), transform::marshal(entity));
        }
        match buffer.index.get(&id) {
            Some(&i) => {
                let write = &mut buffer.pending[i];
                write.new |= new;
                write.fields = fields;
                write.changes.merge(changes);
            }
            None => {
                buffer.index.insert(id.clone(), buffer.pending.len());
                buffer.pending.push(PendingWrite {
                    id,
                    new,
                    fields,
                    changes,
                });
                self.pending += 1;
            }
        }

        if self.pending > self.config.transaction_window {
            debug!(
                pending = self.pending,
                window = self.config.transaction_window,
                "transaction window exceeded, flushing"
            );
            self.flush()?;
        }
        Ok(())
    }

    /// Write every pending entity of every kind, one upsert each.
    ///
    /// On the first failed upsert the error is logged and returned; that
    /// write and everything after it in its class stay pending, as do all
    /// later classes. After a class is fully written its identity cache is
    /// cleared.
    pub fn flush(&mut self) -> ModelResult<()> {
        let mut failure = None;
        for kind in EntityKind::ALL {
            let Some(buffer) = self.buffers.get_mut(&kind) else {
                continue;
            };
            if buffer.pending.is_empty() {
                continue;
            }
            let collection = kind.collection();
            debug!(collection, pending = buffer.pending.len(), "flushing");

            let writes = std::mem::take(&mut buffer.pending);
            buffer.index.clear();
            let mut failed = None;
            for (i, write) in writes.iter().enumerate() {
                if let Err(source) = self.store.upsert(collection, &write.id, &write.to_update(kind)) {
                    error!(collection, id = %write.id, error = %source, "upsert failed during flush");
                    failed = Some((i, source));
                    break;
                }
            }

            if let Some((i, source)) = failed {
                let mut writes = writes;
                let remaining = writes.split_off(i);
                let id = remaining[0].id.clone();
                buffer.requeue(remaining);
                failure = Some(ModelError::StorageOperation {
                    collection: collection.to_string(),
                    id,
                    source,
                });
                break;
            }

            buffer.cache.clear();
            debug!(collection, written = writes.len(), "flushed");
        }

        self.pending = self.buffers.values().map(|b| b.pending.len()).sum();
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Conditionally update a stored record, bypassing the buffers.
    ///
    /// Any cached copy of the record is dropped.
    pub fn update_if(
        &mut self,
        kind: EntityKind,
        id: &str,
        guard: &Filter,
        update: &Update,
    ) -> ModelResult<bool> {
        if let Some(buffer) = self.buffers.get_mut(&kind) {
            buffer.cache.remove(id);
        }
        Ok(self.store.update_if(kind.collection(), id, guard, update)?)
    }

    /// Drop every registered collection and all buffered state.
    ///
    /// Destructive; meant for bootstrap and tests only.
    pub fn reset_schema(&mut self) -> ModelResult<()> {
        for kind in EntityKind::ALL {
            self.store.clear(kind.collection())?;
        }
        self.buffers.clear();
        self.pending = 0;
        info!(collections = EntityKind::ALL.len(), "schema reset");
        Ok(())
    }

    // ---- Inspection ----

    pub fn is_pending(&self, kind: EntityKind, id: &str) -> bool {
        self.buffers
            .get(&kind)
            .is_some_and(|b| b.index.contains_key(id))
    }

    /// Distinct entities waiting for a flush.
    pub fn pending_count(&self) -> usize {
        self.pending
    }

    /// Entities held in the identity cache across all kinds.
    pub fn cached_count(&self) -> usize {
        self.buffers.values().map(|b| b.cache.len()).sum()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("pending", &self.pending)
            .field("cached", &self.cached_count())
            .finish_non_exhaustive()
    }
}
