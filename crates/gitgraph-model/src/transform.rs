//! Conversion between entities and stored documents.
//!
//! Writing attaches `_id` and the discriminator; reading inspects the
//! discriminator and dispatches to the matching concrete type through the
//! closed [`EntityKind`] registry. An unknown discriminator is an error,
//! never a fallback to some generic record.

use gitgraph_store::{Document, ID_FIELD};
use serde_json::Value;

use crate::association::Association;
use crate::entity::{Entity, EntityKind, Identified, ObjectKind, DISCRIMINATOR_FIELD};
use crate::error::{ModelError, ModelResult};
use crate::object::{AnyObject, Blob, Commit, Tag, Tree};
use crate::repository::Repository;

/// A stored record of any registered kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Object(AnyObject),
    Repository(Repository),
    Edge(Association),
}

impl Record {
    pub fn id_str(&self) -> &str {
        match self {
            Record::Object(object) => object.id().as_str(),
            Record::Repository(repository) => repository.id_str(),
            Record::Edge(edge) => edge.id_str(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Object(object) => EntityKind::Object(object.kind()),
            Record::Repository(_) => EntityKind::Repository,
            Record::Edge(edge) => edge.kind(),
        }
    }
}

/// Full stored form of an entity: `_id`, discriminator and declared fields.
pub fn marshal<E: Entity>(entity: &E) -> Document {
    let mut doc = entity.fields();
    doc.insert(ID_FIELD.to_string(), Value::String(entity.id_str().to_string()));
    doc.insert(
        DISCRIMINATOR_FIELD.to_string(),
        Value::String(entity.kind().discriminator().to_string()),
    );
    doc
}

/// The `_id` of a stored document.
pub fn require_id(doc: &Document) -> ModelResult<&str> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError::Validation("record has no string _id".into()))
}

/// The registered kind a stored document claims to be.
pub fn kind_of(doc: &Document) -> ModelResult<EntityKind> {
    let discriminator = doc
        .get(DISCRIMINATOR_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError::Validation("record has no discriminator".into()))?;
    EntityKind::from_discriminator(discriminator)
        .ok_or_else(|| ModelError::Validation(format!("unknown discriminator {discriminator}")))
}

/// Rebuild whichever entity a stored document describes.
pub fn demarshal(doc: &Document) -> ModelResult<Record> {
    let kind = kind_of(doc)?;
    let record = match kind {
        EntityKind::Object(ObjectKind::Blob) => Record::Object(AnyObject::Blob(Blob::load(kind, doc)?)),
        EntityKind::Object(ObjectKind::Tree) => Record::Object(AnyObject::Tree(Tree::load(kind, doc)?)),
        EntityKind::Object(ObjectKind::Commit) => {
            Record::Object(AnyObject::Commit(Commit::load(kind, doc)?))
        }
        EntityKind::Object(ObjectKind::Tag) => Record::Object(AnyObject::Tag(Tag::load(kind, doc)?)),
        EntityKind::Repository => Record::Repository(Repository::load(kind, doc)?),
        EntityKind::Edge(_) => Record::Edge(Association::load(kind, doc)?),
    };
    Ok(record)
}

/// Rebuild a document as `E`, checking that it really is of `kind`.
pub fn decode_as<E: Entity>(kind: EntityKind, doc: &Document) -> ModelResult<E> {
    let stored = kind_of(doc)?;
    if stored != kind {
        return Err(ModelError::Validation(format!(
            "expected a {kind} record, found {stored}"
        )));
    }
    E::load(kind, doc)
}
