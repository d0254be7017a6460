//! Typed edges between git objects.
//!
//! Relationships are never embedded in the objects they connect. Each
//! relation kind has its own collection of small edge documents keyed by
//! `key1 ++ key2`. Because the primary key starts with `key1`, every edge
//! leaving an object is found by a prefix scan over the primary key,
//! without a secondary index; edges arriving at an object are found by
//! equality on the stored `key2`.
//!
//! | relation | key1 | key2 | label |
//! |----------|------|------|-------|
//! | `BlobTree` | blob | tree containing it | entry name |
//! | `TreeParentTree` | tree | tree containing it | entry name |
//! | `TreeCommit` | root tree | commit | |
//! | `TreeTag` | tree | tag pointing at it | |
//! | `CommitParentCommit` | commit | parent commit | |
//! | `CommitTree` | submodule commit | tree containing it | submodule path |
//! | `CommitTag` | commit | tag pointing at it | |
//! | `TagParentTag` | tag | tag pointing at it | |

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use gitgraph_store::{Document, Filter, Query, ID_FIELD};
use gitgraph_types::{EdgeId, ObjectId};
use serde_json::Value;

use crate::canonical::{canonicalize, IdRef};
use crate::cursor::LazyCursor;
use crate::entity::{Entity, EntityKind, EntityState, Identified, ObjectKind};
use crate::error::{ModelError, ModelResult};
use crate::field::SetField;
use crate::session::Session;
use crate::transform;

const KEY1_FIELD: &str = "key1";
const KEY2_FIELD: &str = "key2";
const LABELS_FIELD: &str = "labels";

/// The eight relation kinds, one collection each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    BlobTree,
    TreeParentTree,
    TreeCommit,
    TreeTag,
    CommitParentCommit,
    CommitTree,
    CommitTag,
    TagParentTag,
}

impl Relation {
    pub const ALL: [Relation; 8] = [
        Relation::BlobTree,
        Relation::TreeParentTree,
        Relation::TreeCommit,
        Relation::TreeTag,
        Relation::CommitParentCommit,
        Relation::CommitTree,
        Relation::CommitTag,
        Relation::TagParentTag,
    ];

    pub fn collection(self) -> &'static str {
        match self {
            Relation::BlobTree => "blob_trees",
            Relation::TreeParentTree => "tree_parent_trees",
            Relation::TreeCommit => "tree_commits",
            Relation::TreeTag => "tree_tags",
            Relation::CommitParentCommit => "commit_parent_commits",
            Relation::CommitTree => "commit_trees",
            Relation::CommitTag => "commit_tags",
            Relation::TagParentTag => "tag_parent_tags",
        }
    }

    pub fn discriminator(self) -> &'static str {
        match self {
            Relation::BlobTree => "blob_tree",
            Relation::TreeParentTree => "tree_parent_tree",
            Relation::TreeCommit => "tree_commit",
            Relation::TreeTag => "tree_tag",
            Relation::CommitParentCommit => "commit_parent_commit",
            Relation::CommitTree => "commit_tree",
            Relation::CommitTag => "commit_tag",
            Relation::TagParentTag => "tag_parent_tag",
        }
    }

    /// Kind of the object named by `key1`.
    pub fn source(self) -> ObjectKind {
        match self {
            Relation::BlobTree => ObjectKind::Blob,
            Relation::TreeParentTree | Relation::TreeCommit | Relation::TreeTag => ObjectKind::Tree,
            Relation::CommitParentCommit | Relation::CommitTree | Relation::CommitTag => {
                ObjectKind::Commit
            }
            Relation::TagParentTag => ObjectKind::Tag,
        }
    }

    /// Kind of the object named by `key2`.
    pub fn target(self) -> ObjectKind {
        match self {
            Relation::BlobTree | Relation::TreeParentTree | Relation::CommitTree => ObjectKind::Tree,
            Relation::TreeCommit | Relation::CommitParentCommit => ObjectKind::Commit,
            Relation::TreeTag | Relation::CommitTag | Relation::TagParentTag => ObjectKind::Tag,
        }
    }

    /// Whether edges of this kind carry labels.
    pub fn is_labeled(self) -> bool {
        matches!(
            self,
            Relation::BlobTree | Relation::TreeParentTree | Relation::CommitTree
        )
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.discriminator())
    }
}

impl FromStr for Relation {
    type Err = ModelError;

    /// Accepts the discriminator, with `-` or `_` as separator.
    fn from_str(s: &str) -> ModelResult<Self> {
        let normalized = s.replace('-', "_");
        Relation::ALL
            .into_iter()
            .find(|r| r.discriminator() == normalized)
            .ok_or_else(|| ModelError::IllegalArgument(format!("unknown relation {s}")))
    }
}

/// One stored edge with its label set.
#[derive(Clone, Debug, PartialEq)]
pub struct Association {
    relation: Relation,
    id: EdgeId,
    labels: SetField<String>,
    state: EntityState,
}

impl Association {
    /// An unsaved edge from `key1` to `key2`.
    pub fn new(relation: Relation, key1: &ObjectId, key2: &ObjectId) -> Self {
        Self {
            relation,
            id: EdgeId::between(key1, key2),
            labels: SetField::new(LABELS_FIELD),
            state: EntityState::fresh(),
        }
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn id(&self) -> &EdgeId {
        &self.id
    }

    pub fn key1(&self) -> &str {
        self.id.key1()
    }

    pub fn key2(&self) -> &str {
        self.id.key2()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(&label.to_string())
    }

    /// Returns `false` if the label was already present.
    pub fn add_label(&mut self, label: &str) -> bool {
        self.labels.add(label.to_string(), self.state.changes_mut())
    }

    /// Load a stored edge.
    pub fn get(session: &mut Session, relation: Relation, key1: &ObjectId, key2: &ObjectId) -> ModelResult<Self> {
        session.get(relation.into(), EdgeId::between(key1, key2).as_str())
    }

    /// Record the edge `key1 -> key2`, optionally labeled, in the session.
    ///
    /// Linking an existing `(key1, key2, label)` again is a no-op; a new
    /// label for an existing pair joins its label set.
    pub fn link(
        session: &mut Session,
        relation: Relation,
        key1: IdRef<'_>,
        key2: IdRef<'_>,
        label: Option<&str>,
    ) -> ModelResult<()> {
        let key1 = resolve_key(key1, relation.source())?;
        let key2 = resolve_key(key2, relation.target())?;
        let id = EdgeId::between(&key1, &key2);
        let mut edge: Association = session.get_or_create(relation.into(), id.as_str())?;
        if let Some(label) = label {
            edge.add_label(label);
        }
        session.save(&mut edge)
    }

    /// Edges leaving `key1`, as `(key2, label)`.
    ///
    /// A full 40-character id prefixes exactly the edges of one source.
    pub fn targets_of(session: &Session, relation: Relation, key1: &ObjectId) -> ModelResult<EdgeCursor> {
        let query = Query::new(Filter::prefix(ID_FIELD, key1.as_str())?);
        let edges = session.find(relation.into(), &query)?;
        Ok(EdgeCursor::new(edges, Side::Target))
    }

    /// Edges arriving at `key2`, as `(key1, label)`.
    pub fn sources_of(session: &Session, relation: Relation, key2: &ObjectId) -> ModelResult<EdgeCursor> {
        let query = Query::new(Filter::eq(KEY2_FIELD, key2.as_str()));
        let edges = session.find(relation.into(), &query)?;
        Ok(EdgeCursor::new(edges, Side::Source))
    }

    /// Every stored edge of one relation.
    pub fn all(session: &Session, relation: Relation) -> ModelResult<LazyCursor<Association>> {
        session.find(relation.into(), &Query::new(Filter::All))
    }
}

/// Turn a reference into the object id an edge endpoint needs.
///
/// An entity reference must be of the kind the relation expects.
fn resolve_key(reference: IdRef<'_>, expected: ObjectKind) -> ModelResult<ObjectId> {
    if let Some(kind) = reference.kind() {
        if kind != EntityKind::Object(expected) {
            return Err(ModelError::IllegalArgument(format!(
                "expected a {expected} reference, got {kind}"
            )));
        }
    }
    Ok(ObjectId::parse(canonicalize(reference))?)
}

impl Identified for Association {
    fn id_str(&self) -> &str {
        self.id.as_str()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Edge(self.relation)
    }
}

impl Entity for Association {
    fn state(&self) -> &EntityState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn stub(kind: EntityKind, id: &str) -> ModelResult<Self> {
        let relation = relation_of(kind)?;
        Ok(Self {
            relation,
            id: parse_edge_id(id)?,
            labels: SetField::new(LABELS_FIELD),
            state: EntityState::fresh(),
        })
    }

    fn load(kind: EntityKind, doc: &Document) -> ModelResult<Self> {
        let relation = relation_of(kind)?;
        Ok(Self {
            relation,
            id: parse_edge_id(transform::require_id(doc)?)?,
            labels: SetField::load(LABELS_FIELD, doc)?,
            state: EntityState::stored(),
        })
    }

    fn fields(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(KEY1_FIELD.into(), Value::String(self.key1().to_string()));
        doc.insert(KEY2_FIELD.into(), Value::String(self.key2().to_string()));
        self.labels.write(&mut doc);
        doc
    }
}

fn relation_of(kind: EntityKind) -> ModelResult<Relation> {
    match kind {
        EntityKind::Edge(relation) => Ok(relation),
        other => Err(ModelError::Validation(format!("{other} is not an edge kind"))),
    }
}

fn parse_edge_id(id: &str) -> ModelResult<EdgeId> {
    EdgeId::parse(id).map_err(|e| ModelError::Validation(format!("edge id {id:?}: {e}")))
}

#[derive(Clone, Copy, Debug)]
enum Side {
    Source,
    Target,
}

/// Lazily decoded edges as `(peer id, label)`.
///
/// An edge with several labels yields one item per label; an unlabeled
/// edge yields a single item with `None`.
pub struct EdgeCursor {
    edges: LazyCursor<Association>,
    side: Side,
    ready: VecDeque<(ObjectId, Option<String>)>,
}

impl EdgeCursor {
    fn new(edges: LazyCursor<Association>, side: Side) -> Self {
        Self {
            edges,
            side,
            ready: VecDeque::new(),
        }
    }

    /// Distinct peer ids, dropping labels.
    pub fn peers(self) -> ModelResult<Vec<ObjectId>> {
        let mut peers: Vec<ObjectId> = Vec::new();
        for item in self {
            let (peer, _) = item?;
            if peers.last() != Some(&peer) {
                peers.push(peer);
            }
        }
        Ok(peers)
    }

    fn expand(&mut self, edge: Association) -> ModelResult<()> {
        let peer = match self.side {
            Side::Target => edge.key2(),
            Side::Source => edge.key1(),
        };
        let peer = ObjectId::parse(peer)?;
        if edge.labels.is_empty() {
            self.ready.push_back((peer, None));
        } else {
            for label in edge.labels() {
                self.ready.push_back((peer.clone(), Some(label.to_string())));
            }
        }
        Ok(())
    }
}

impl Iterator for EdgeCursor {
    type Item = ModelResult<(ObjectId, Option<String>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(Ok(item));
            }
            let edge = match self.edges.next()? {
                Ok(edge) => edge,
                Err(e) => return Some(Err(e)),
            };
            if let Err(e) = self.expand(edge) {
                return Some(Err(e));
            }
        }
    }
}

impl fmt::Debug for EdgeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeCursor")
            .field("side", &self.side)
            .field("buffered", &self.ready.len())
            .finish_non_exhaustive()
    }
}
