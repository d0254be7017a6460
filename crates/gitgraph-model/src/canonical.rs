use gitgraph_store::ID_FIELD;
use gitgraph_types::{ObjectId, RepositoryId};
use serde_json::Value;

use crate::entity::{EntityKind, Identified, DISCRIMINATOR_FIELD};
use crate::error::{ModelError, ModelResult};

/// Something that names an entity: a raw id, or the entity itself.
#[derive(Clone, Copy)]
pub enum IdRef<'a> {
    Raw(&'a str),
    Entity(&'a dyn Identified),
}

impl<'a> IdRef<'a> {
    /// The kind of the referenced entity, when known.
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            IdRef::Raw(_) => None,
            IdRef::Entity(entity) => Some(entity.kind()),
        }
    }
}

/// The id named by a reference.
pub fn canonicalize(reference: IdRef<'_>) -> &str {
    match reference {
        IdRef::Raw(id) => id,
        IdRef::Entity(entity) => entity.id_str(),
    }
}

impl std::fmt::Debug for IdRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdRef::Raw(id) => f.debug_tuple("Raw").field(id).finish(),
            IdRef::Entity(entity) => f
                .debug_struct("Entity")
                .field("kind", &entity.kind())
                .field("id", &entity.id_str())
                .finish(),
        }
    }
}

impl<'a> From<&'a str> for IdRef<'a> {
    fn from(id: &'a str) -> Self {
        IdRef::Raw(id)
    }
}

impl<'a> From<&'a String> for IdRef<'a> {
    fn from(id: &'a String) -> Self {
        IdRef::Raw(id)
    }
}

impl<'a> From<&'a ObjectId> for IdRef<'a> {
    fn from(id: &'a ObjectId) -> Self {
        IdRef::Raw(id.as_str())
    }
}

impl<'a> From<&'a RepositoryId> for IdRef<'a> {
    fn from(id: &'a RepositoryId) -> Self {
        IdRef::Raw(id.as_str())
    }
}

/// Interpret a loosely typed value as a reference.
///
/// A JSON string is a raw id. An object carrying a string `_id` and a
/// registered discriminator is a stored entity and names its `_id`.
/// Anything else is an illegal argument.
impl<'a> TryFrom<&'a Value> for IdRef<'a> {
    type Error = ModelError;

    fn try_from(value: &'a Value) -> ModelResult<Self> {
        match value {
            Value::String(id) => Ok(IdRef::Raw(id)),
            Value::Object(map) => {
                let registered = map
                    .get(DISCRIMINATOR_FIELD)
                    .and_then(Value::as_str)
                    .and_then(EntityKind::from_discriminator)
                    .is_some();
                match map.get(ID_FIELD) {
                    Some(Value::String(id)) if registered => Ok(IdRef::Raw(id)),
                    _ => Err(ModelError::IllegalArgument(format!(
                        "object is not a stored entity reference: {value}"
                    ))),
                }
            }
            other => Err(ModelError::IllegalArgument(format!(
                "cannot use {other} as an id"
            ))),
        }
    }
}
