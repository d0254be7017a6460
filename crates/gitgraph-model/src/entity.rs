//! The closed registry of entity kinds and the traits every entity
//! implements.

use std::fmt;

use gitgraph_store::Document;

use crate::association::Relation;
use crate::error::ModelResult;
use crate::field::Changes;

/// Stored field naming the concrete kind of a record.
pub const DISCRIMINATOR_FIELD: &str = "__type__";

/// The four kinds of git object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    /// Fixed order used when a query spans every object collection.
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Blob,
        ObjectKind::Tree,
        ObjectKind::Commit,
        ObjectKind::Tag,
    ];

    pub fn collection(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blobs",
            ObjectKind::Tree => "trees",
            ObjectKind::Commit => "commits",
            ObjectKind::Tag => "tags",
        }
    }

    pub fn discriminator(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.discriminator())
    }
}

/// Every kind of record the model stores. Each kind owns one collection
/// and one discriminator value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Object(ObjectKind),
    Repository,
    Edge(Relation),
}

impl EntityKind {
    /// Every registered kind, in flush order.
    pub const ALL: [EntityKind; 13] = [
        EntityKind::Object(ObjectKind::Blob),
        EntityKind::Object(ObjectKind::Tree),
        EntityKind::Object(ObjectKind::Commit),
        EntityKind::Object(ObjectKind::Tag),
        EntityKind::Repository,
        EntityKind::Edge(Relation::BlobTree),
        EntityKind::Edge(Relation::TreeParentTree),
        EntityKind::Edge(Relation::TreeCommit),
        EntityKind::Edge(Relation::TreeTag),
        EntityKind::Edge(Relation::CommitParentCommit),
        EntityKind::Edge(Relation::CommitTree),
        EntityKind::Edge(Relation::CommitTag),
        EntityKind::Edge(Relation::TagParentTag),
    ];

    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Object(kind) => kind.collection(),
            EntityKind::Repository => "repositories",
            EntityKind::Edge(relation) => relation.collection(),
        }
    }

    pub fn discriminator(self) -> &'static str {
        match self {
            EntityKind::Object(kind) => kind.discriminator(),
            EntityKind::Repository => "repository",
            EntityKind::Edge(relation) => relation.discriminator(),
        }
    }

    /// Look up a kind by its stored discriminator.
    pub fn from_discriminator(value: &str) -> Option<EntityKind> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.discriminator() == value)
    }
}

impl From<ObjectKind> for EntityKind {
    fn from(kind: ObjectKind) -> Self {
        EntityKind::Object(kind)
    }
}

impl From<Relation> for EntityKind {
    fn from(relation: Relation) -> Self {
        EntityKind::Edge(relation)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.discriminator())
    }
}

/// Persistence bookkeeping carried by every entity.
///
/// `new` is true for stubs that have never been read from the store.
/// `changes` holds the operations recorded since the entity was loaded or
/// last handed to the session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityState {
    new: bool,
    changes: Changes,
}

impl EntityState {
    /// State of an unsaved stub.
    pub fn fresh() -> Self {
        Self {
            new: true,
            changes: Changes::new(),
        }
    }

    /// State of a record just read from the store.
    pub fn stored() -> Self {
        Self::default()
    }

    pub fn is_new(&self) -> bool {
        self.new
    }

    /// New entities always count as changed.
    pub fn is_changed(&self) -> bool {
        self.new || !self.changes.is_empty()
    }

    pub fn changes(&self) -> &Changes {
        &self.changes
    }

    pub fn changes_mut(&mut self) -> &mut Changes {
        &mut self.changes
    }

    /// Move the state out, leaving this entity clean and not new.
    pub(crate) fn take(&mut self) -> (bool, Changes) {
        let taken = std::mem::take(self);
        (taken.new, taken.changes)
    }
}

/// Anything with a stored identity.
pub trait Identified {
    fn id_str(&self) -> &str;
    fn kind(&self) -> EntityKind;
}

/// A persistent entity: identity, declared fields and change state.
pub trait Entity: Identified + Clone + Send + 'static {
    fn state(&self) -> &EntityState;
    fn state_mut(&mut self) -> &mut EntityState;

    /// An unsaved stub of `kind` with only `id` populated.
    fn stub(kind: EntityKind, id: &str) -> ModelResult<Self>;

    /// Rebuild from a stored document already known to be of `kind`.
    fn load(kind: EntityKind, doc: &Document) -> ModelResult<Self>;

    /// Declared fields by stored name, without `_id` or the discriminator.
    fn fields(&self) -> Document;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_names_are_unique() {
        let collections: HashSet<_> = EntityKind::ALL.iter().map(|k| k.collection()).collect();
        let discriminators: HashSet<_> =
            EntityKind::ALL.iter().map(|k| k.discriminator()).collect();
        assert_eq!(collections.len(), EntityKind::ALL.len());
        assert_eq!(discriminators.len(), EntityKind::ALL.len());
    }

    #[test]
    fn discriminator_lookup() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_discriminator(kind.discriminator()), Some(kind));
        }
        assert_eq!(EntityKind::from_discriminator("person"), None);
    }

    #[test]
    fn object_kinds_come_first() {
        for (i, kind) in ObjectKind::ALL.into_iter().enumerate() {
            assert_eq!(EntityKind::ALL[i], EntityKind::Object(kind));
        }
    }

    #[test]
    fn state_take_leaves_clean() {
        let mut state = EntityState::fresh();
        state.changes_mut().record_set("dirty", serde_json::json!(true));
        assert!(state.is_changed());

        let (new, changes) = state.take();
        assert!(new);
        assert_eq!(changes.len(), 1);
        assert!(!state.is_new());
        assert!(!state.is_changed());
    }
}
