//! Blobs, trees, commits and tags.
//!
//! All four share one representation, [`GitObject`], parameterized by a
//! kind marker. The only state an object document carries is its
//! reprocessing flag and its repository memberships; structure (which
//! tree holds which blob, which commit is whose parent) lives in edge
//! collections and is written and read through [`Association`].

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;

use gitgraph_store::{Document, Filter, Query, ID_FIELD};
use gitgraph_types::{ObjectId, RepositoryId};
use tracing::debug;

use crate::association::{Association, EdgeCursor, Relation};
use crate::canonical::IdRef;
use crate::cursor::{LazyCursor, Page};
use crate::entity::{Entity, EntityKind, EntityState, Identified, ObjectKind};
use crate::error::{ModelError, ModelResult};
use crate::field::{Scalar, SetField};
use crate::repository::Repository;
use crate::session::Session;
use crate::transform;

const DIRTY_FIELD: &str = "dirty";
pub(crate) const REPOSITORY_IDS_FIELD: &str = "repository_ids";

/// Compile-time tag selecting one of the four object kinds.
pub trait ObjectType: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: ObjectKind;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BlobKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TreeKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CommitKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TagKind;

impl ObjectType for BlobKind {
    const KIND: ObjectKind = ObjectKind::Blob;
}

impl ObjectType for TreeKind {
    const KIND: ObjectKind = ObjectKind::Tree;
}

impl ObjectType for CommitKind {
    const KIND: ObjectKind = ObjectKind::Commit;
}

impl ObjectType for TagKind {
    const KIND: ObjectKind = ObjectKind::Tag;
}

pub type Blob = GitObject<BlobKind>;
pub type Tree = GitObject<TreeKind>;
pub type Commit = GitObject<CommitKind>;
pub type Tag = GitObject<TagKind>;

/// A git object of kind `K`.
#[derive(Clone, Debug, PartialEq)]
pub struct GitObject<K: ObjectType> {
    id: ObjectId,
    dirty: Scalar<bool>,
    repository_ids: SetField<RepositoryId>,
    state: EntityState,
    _kind: PhantomData<K>,
}

impl<K: ObjectType> GitObject<K> {
    /// An unsaved object with default fields.
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            dirty: Scalar::new(DIRTY_FIELD, false),
            repository_ids: SetField::new(REPOSITORY_IDS_FIELD),
            state: EntityState::fresh(),
            _kind: PhantomData,
        }
    }

    pub fn entity_kind() -> EntityKind {
        EntityKind::Object(K::KIND)
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn object_kind(&self) -> ObjectKind {
        K::KIND
    }

    /// Whether the object is flagged for reprocessing.
    pub fn is_dirty(&self) -> bool {
        *self.dirty.get()
    }

    pub fn mark_dirty(&mut self) -> bool {
        self.dirty.set(true, self.state.changes_mut())
    }

    pub fn clear_dirty(&mut self) -> bool {
        self.dirty.set(false, self.state.changes_mut())
    }

    pub fn save(&mut self, session: &mut Session) -> ModelResult<()> {
        session.save(self)
    }

    // ---- Class-level queries ----

    pub fn get(session: &mut Session, id: &str) -> ModelResult<Self> {
        session.get(Self::entity_kind(), id)
    }

    pub fn get_or_create(session: &mut Session, id: &str) -> ModelResult<Self> {
        session.get_or_create(Self::entity_kind(), id)
    }

    pub fn exists(session: &Session, id: &str) -> ModelResult<bool> {
        session.exists(Self::entity_kind(), id)
    }

    pub fn count(session: &Session) -> ModelResult<u64> {
        session.count(Self::entity_kind())
    }

    /// Every stored object of this kind.
    pub fn all(session: &Session) -> ModelResult<LazyCursor<Self>> {
        session.find(Self::entity_kind(), &Query::new(Filter::All))
    }

    /// Stored objects still flagged for reprocessing.
    pub fn dirty_objects(session: &Session) -> ModelResult<LazyCursor<Self>> {
        session.find(Self::entity_kind(), &Query::new(Filter::eq(DIRTY_FIELD, true)))
    }

    /// The stored objects among `ids`; ids with no record are skipped.
    pub fn find_matching<'a>(
        session: &Session,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> ModelResult<Vec<Self>> {
        let mut found = Vec::new();
        for id in ids {
            let query = Query::new(Filter::id(id)).limit(1);
            if let Some(object) = session.find(Self::entity_kind(), &query)?.next() {
                found.push(object?);
            }
        }
        Ok(found)
    }

    /// Exact or prefix lookup by SHA1, one page at a time.
    ///
    /// `total` counts every match regardless of `offset` and `limit`.
    pub fn lookup_by_sha1(
        session: &Session,
        sha1: &str,
        partial: bool,
        offset: usize,
        limit: usize,
    ) -> ModelResult<Page<Self>> {
        let filter = sha1_filter(sha1, partial)?;
        let total = session.count_matching(Self::entity_kind(), &filter)?;
        let query = Query::new(filter).skip(offset).limit(limit);
        let items = session
            .find(Self::entity_kind(), &query)?
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(Page { items, total })
    }
}

fn sha1_filter(sha1: &str, partial: bool) -> ModelResult<Filter> {
    let sha1 = sha1.to_ascii_lowercase();
    if partial {
        Ok(Filter::prefix(ID_FIELD, &sha1)?)
    } else {
        Ok(Filter::id(&sha1))
    }
}

impl<'a, K: ObjectType> From<&'a GitObject<K>> for IdRef<'a> {
    fn from(object: &'a GitObject<K>) -> Self {
        IdRef::Entity(object)
    }
}

impl<K: ObjectType> Identified for GitObject<K> {
    fn id_str(&self) -> &str {
        self.id.as_str()
    }

    fn kind(&self) -> EntityKind {
        Self::entity_kind()
    }
}

impl<K: ObjectType> Entity for GitObject<K> {
    fn state(&self) -> &EntityState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn stub(kind: EntityKind, id: &str) -> ModelResult<Self> {
        check_kind::<K>(kind)?;
        Ok(Self::new(ObjectId::parse(id)?))
    }

    fn load(kind: EntityKind, doc: &Document) -> ModelResult<Self> {
        check_kind::<K>(kind)?;
        let id = transform::require_id(doc)?;
        let id = ObjectId::parse(id)
            .map_err(|e| ModelError::Validation(format!("object id {id:?}: {e}")))?;
        Ok(Self {
            id,
            dirty: Scalar::load(DIRTY_FIELD, doc, false)?,
            repository_ids: SetField::load(REPOSITORY_IDS_FIELD, doc)?,
            state: EntityState::stored(),
            _kind: PhantomData,
        })
    }

    fn fields(&self) -> Document {
        let mut doc = Document::new();
        self.dirty.write(&mut doc);
        self.repository_ids.write(&mut doc);
        doc
    }
}

fn check_kind<K: ObjectType>(kind: EntityKind) -> ModelResult<()> {
    if kind != EntityKind::Object(K::KIND) {
        return Err(ModelError::Validation(format!(
            "{kind} record cannot be read as a {}",
            K::KIND
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Objects that record which repositories contain them.
pub trait HasRepositories {
    fn repository_ids(&self) -> &SetField<RepositoryId>;

    /// Returns `false` if the repository was already recorded.
    fn add_repository(&mut self, repository: &RepositoryId) -> bool;

    fn in_repository(&self, repository: &RepositoryId) -> bool {
        self.repository_ids().contains(repository)
    }

    /// Load every recorded repository.
    fn repositories(&self, session: &mut Session) -> ModelResult<Vec<Repository>> {
        self.repository_ids()
            .iter()
            .map(|id| Repository::get(session, id.as_str()))
            .collect()
    }
}

impl<K: ObjectType> HasRepositories for GitObject<K> {
    fn repository_ids(&self) -> &SetField<RepositoryId> {
        &self.repository_ids
    }

    fn add_repository(&mut self, repository: &RepositoryId) -> bool {
        self.repository_ids
            .add(repository.clone(), self.state.changes_mut())
    }
}

/// Objects with outgoing "contained in" or "parent" edges.
pub trait HasParents: Identified {
    /// Relation whose `key1` is this object and whose `key2` is a parent.
    const PARENT_RELATION: Relation;

    fn parents(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::targets_of(session, Self::PARENT_RELATION, &ObjectId::parse(self.id_str())?)
    }
}

/// Objects other objects of the same kind point at as their parent.
pub trait HasChildren: Identified {
    /// Relation whose `key2` is this object.
    const CHILD_RELATION: Relation;

    fn children(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::sources_of(session, Self::CHILD_RELATION, &ObjectId::parse(self.id_str())?)
    }
}

impl HasParents for Blob {
    const PARENT_RELATION: Relation = Relation::BlobTree;
}

impl HasParents for Tree {
    const PARENT_RELATION: Relation = Relation::TreeParentTree;
}

impl HasParents for Commit {
    const PARENT_RELATION: Relation = Relation::CommitParentCommit;
}

impl HasParents for Tag {
    const PARENT_RELATION: Relation = Relation::TagParentTag;
}

impl HasChildren for Tree {
    const CHILD_RELATION: Relation = Relation::TreeParentTree;
}

impl HasChildren for Commit {
    const CHILD_RELATION: Relation = Relation::CommitParentCommit;
}

impl HasChildren for Tag {
    const CHILD_RELATION: Relation = Relation::TagParentTag;
}

/// Labeled edges collected as `(peer, label)`, skipping unlabeled ones.
fn named(edges: EdgeCursor) -> ModelResult<Vec<(ObjectId, String)>> {
    let mut named = Vec::new();
    for item in edges {
        if let (peer, Some(name)) = item? {
            named.push((peer, name));
        }
    }
    Ok(named)
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

impl Blob {
    /// Record that `tree` holds this blob under `name`.
    pub fn add_parent<'a>(
        &self,
        session: &mut Session,
        tree: impl Into<IdRef<'a>>,
        name: &str,
    ) -> ModelResult<()> {
        Association::link(session, Relation::BlobTree, self.into(), tree.into(), Some(name))
    }

    /// Trees holding this blob, with the entry name in each.
    pub fn parents_with_names(&self, session: &Session) -> ModelResult<Vec<(ObjectId, String)>> {
        named(self.parents(session)?)
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

impl Tree {
    /// Record that `tree` holds this tree under `name`.
    pub fn add_parent<'a>(
        &self,
        session: &mut Session,
        tree: impl Into<IdRef<'a>>,
        name: &str,
    ) -> ModelResult<()> {
        Association::link(session, Relation::TreeParentTree, self.into(), tree.into(), Some(name))
    }

    /// Record that this tree holds `blob` under `name`.
    pub fn add_blob<'a>(
        &self,
        session: &mut Session,
        blob: impl Into<IdRef<'a>>,
        name: &str,
    ) -> ModelResult<()> {
        Association::link(session, Relation::BlobTree, blob.into(), self.into(), Some(name))
    }

    /// Record that this tree holds `subtree` under `name`.
    pub fn add_subtree<'a>(
        &self,
        session: &mut Session,
        subtree: impl Into<IdRef<'a>>,
        name: &str,
    ) -> ModelResult<()> {
        Association::link(session, Relation::TreeParentTree, subtree.into(), self.into(), Some(name))
    }

    /// Record that this is the root tree of `commit`.
    pub fn add_commit<'a>(&self, session: &mut Session, commit: impl Into<IdRef<'a>>) -> ModelResult<()> {
        Association::link(session, Relation::TreeCommit, self.into(), commit.into(), None)
    }

    /// Record that `tag` points at this tree.
    pub fn add_tag<'a>(&self, session: &mut Session, tag: impl Into<IdRef<'a>>) -> ModelResult<()> {
        Association::link(session, Relation::TreeTag, self.into(), tag.into(), None)
    }

    pub fn parents_with_names(&self, session: &Session) -> ModelResult<Vec<(ObjectId, String)>> {
        named(self.parents(session)?)
    }

    /// Blobs in this tree, with their entry names.
    pub fn blobs(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::sources_of(session, Relation::BlobTree, self.id())
    }

    /// Trees in this tree, with their entry names.
    pub fn subtrees(&self, session: &Session) -> ModelResult<EdgeCursor> {
        self.children(session)
    }

    /// Commits whose root tree this is.
    pub fn commits(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::targets_of(session, Relation::TreeCommit, self.id())
    }

    pub fn tags(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::targets_of(session, Relation::TreeTag, self.id())
    }

    /// Submodule commits in this tree, with their paths.
    pub fn submodules(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::sources_of(session, Relation::CommitTree, self.id())
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

impl Commit {
    pub fn add_parent<'a>(&self, session: &mut Session, parent: impl Into<IdRef<'a>>) -> ModelResult<()> {
        Association::link(session, Relation::CommitParentCommit, self.into(), parent.into(), None)
    }

    pub fn add_parents<'a, I>(&self, session: &mut Session, parents: I) -> ModelResult<()>
    where
        I: IntoIterator,
        I::Item: Into<IdRef<'a>>,
    {
        for parent in parents {
            self.add_parent(session, parent)?;
        }
        Ok(())
    }

    /// Record that `tree` holds this commit as a submodule at `path`.
    pub fn add_as_submodule_of<'a>(
        &self,
        session: &mut Session,
        tree: impl Into<IdRef<'a>>,
        path: &str,
    ) -> ModelResult<()> {
        Association::link(session, Relation::CommitTree, self.into(), tree.into(), Some(path))
    }

    /// Record that `tree` is the root tree of this commit.
    pub fn add_tree<'a>(&self, session: &mut Session, tree: impl Into<IdRef<'a>>) -> ModelResult<()> {
        Association::link(session, Relation::TreeCommit, tree.into(), self.into(), None)
    }

    /// Record that `tag` points at this commit.
    pub fn add_tag<'a>(&self, session: &mut Session, tag: impl Into<IdRef<'a>>) -> ModelResult<()> {
        Association::link(session, Relation::CommitTag, self.into(), tag.into(), None)
    }

    /// Root trees of this commit.
    pub fn trees(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::sources_of(session, Relation::TreeCommit, self.id())
    }

    /// Trees holding this commit as a submodule, with the paths.
    pub fn submodule_of(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::targets_of(session, Relation::CommitTree, self.id())
    }

    pub fn tags(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::targets_of(session, Relation::CommitTag, self.id())
    }

    /// Add `repository` to this commit and to every ancestor that does not
    /// have it yet.
    ///
    /// Membership of a commit implies membership of all its ancestors, so
    /// the walk stops at any ancestor already carrying the repository.
    /// Pending writes are flushed first so parent edges recorded in this
    /// session are visible. Ancestors with no stored record are created.
    /// Returns how many commits were updated.
    pub fn add_repository_recursive(
        &mut self,
        session: &mut Session,
        repository: &RepositoryId,
    ) -> ModelResult<usize> {
        session.flush()?;
        if !self.add_repository(repository) {
            return Ok(0);
        }
        session.save(self)?;

        let mut updated = 1;
        let mut seen: HashSet<ObjectId> = HashSet::from([self.id.clone()]);
        let mut queue: VecDeque<ObjectId> = self.parents(session)?.peers()?.into();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let mut commit = match Commit::get(session, id.as_str()) {
                Ok(commit) => commit,
                Err(e) if e.is_not_found() => Commit::new(id),
                Err(e) => return Err(e),
            };
            if !commit.add_repository(repository) {
                continue;
            }
            let parents = commit.parents(session)?.peers()?;
            session.save(&mut commit)?;
            updated += 1;
            debug!(commit = %commit.id(), repository = %repository, "repository propagated");
            queue.extend(parents);
        }
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

impl Tag {
    /// Record that `tag` points at this tag.
    pub fn add_parent<'a>(&self, session: &mut Session, tag: impl Into<IdRef<'a>>) -> ModelResult<()> {
        Association::link(session, Relation::TagParentTag, self.into(), tag.into(), None)
    }

    /// Commits this tag points at.
    pub fn commits(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::sources_of(session, Relation::CommitTag, self.id())
    }

    /// Trees this tag points at.
    pub fn trees(&self, session: &Session) -> ModelResult<EdgeCursor> {
        Association::sources_of(session, Relation::TreeTag, self.id())
    }
}

// ---------------------------------------------------------------------------
// AnyObject
// ---------------------------------------------------------------------------

/// An object of any kind, for queries that span all four collections.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyObject {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl AnyObject {
    pub fn id(&self) -> &ObjectId {
        match self {
            AnyObject::Blob(o) => o.id(),
            AnyObject::Tree(o) => o.id(),
            AnyObject::Commit(o) => o.id(),
            AnyObject::Tag(o) => o.id(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            AnyObject::Blob(_) => ObjectKind::Blob,
            AnyObject::Tree(_) => ObjectKind::Tree,
            AnyObject::Commit(_) => ObjectKind::Commit,
            AnyObject::Tag(_) => ObjectKind::Tag,
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            AnyObject::Blob(o) => o.is_dirty(),
            AnyObject::Tree(o) => o.is_dirty(),
            AnyObject::Commit(o) => o.is_dirty(),
            AnyObject::Tag(o) => o.is_dirty(),
        }
    }

    pub fn repository_ids(&self) -> &SetField<RepositoryId> {
        match self {
            AnyObject::Blob(o) => o.repository_ids(),
            AnyObject::Tree(o) => o.repository_ids(),
            AnyObject::Commit(o) => o.repository_ids(),
            AnyObject::Tag(o) => o.repository_ids(),
        }
    }

    pub fn marshal(&self) -> Document {
        match self {
            AnyObject::Blob(o) => transform::marshal(o),
            AnyObject::Tree(o) => transform::marshal(o),
            AnyObject::Commit(o) => transform::marshal(o),
            AnyObject::Tag(o) => transform::marshal(o),
        }
    }

    fn decode(kind: ObjectKind, doc: &Document) -> ModelResult<Self> {
        let entity_kind = EntityKind::Object(kind);
        Ok(match kind {
            ObjectKind::Blob => AnyObject::Blob(transform::decode_as(entity_kind, doc)?),
            ObjectKind::Tree => AnyObject::Tree(transform::decode_as(entity_kind, doc)?),
            ObjectKind::Commit => AnyObject::Commit(transform::decode_as(entity_kind, doc)?),
            ObjectKind::Tag => AnyObject::Tag(transform::decode_as(entity_kind, doc)?),
        })
    }

    /// Find an object by exact id in whichever collection holds it.
    pub fn get(session: &mut Session, id: &str) -> ModelResult<Self> {
        for kind in ObjectKind::ALL {
            let found = match kind {
                ObjectKind::Blob => Blob::get(session, id).map(AnyObject::Blob),
                ObjectKind::Tree => Tree::get(session, id).map(AnyObject::Tree),
                ObjectKind::Commit => Commit::get(session, id).map(AnyObject::Commit),
                ObjectKind::Tag => Tag::get(session, id).map(AnyObject::Tag),
            };
            match found {
                Err(e) if e.is_not_found() => continue,
                other => return other,
            }
        }
        Err(ModelError::NotFound {
            collection: "objects".into(),
            id: id.to_string(),
        })
    }

    /// Exact or prefix lookup across every object collection.
    ///
    /// Collections are visited in the fixed order blob, tree, commit, tag;
    /// `offset` and `limit` apply to that concatenated sequence and `total`
    /// is the sum of the per-collection counts.
    pub fn lookup_by_sha1(
        session: &Session,
        sha1: &str,
        partial: bool,
        offset: usize,
        limit: usize,
    ) -> ModelResult<Page<Self>> {
        let filter = sha1_filter(sha1, partial)?;
        let mut counts = Vec::with_capacity(ObjectKind::ALL.len());
        for kind in ObjectKind::ALL {
            counts.push((kind, session.count_matching(kind.into(), &filter)?));
        }
        let total = counts.iter().map(|(_, count)| count).sum();

        let mut items = Vec::new();
        let mut skip = offset as u64;
        for (kind, count) in counts {
            if items.len() >= limit {
                break;
            }
            if skip >= count {
                skip -= count;
                continue;
            }
            let query = Query::new(filter.clone())
                .skip(skip as usize)
                .limit(limit - items.len());
            skip = 0;
            for doc in session.store().find(kind.collection(), &query)? {
                items.push(AnyObject::decode(kind, &doc?)?);
            }
        }
        Ok(Page { items, total })
    }
}

impl<'a> From<&'a AnyObject> for IdRef<'a> {
    fn from(object: &'a AnyObject) -> Self {
        match object {
            AnyObject::Blob(o) => IdRef::Entity(o),
            AnyObject::Tree(o) => IdRef::Entity(o),
            AnyObject::Commit(o) => IdRef::Entity(o),
            AnyObject::Tag(o) => IdRef::Entity(o),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitgraph_store::InMemoryDocumentStore;
    use std::sync::Arc;

    fn oid(n: usize) -> ObjectId {
        ObjectId::parse(&format!("{n:040x}")).unwrap()
    }

    fn session() -> Session {
        Session::new(Arc::new(InMemoryDocumentStore::new()))
    }

    // -----------------------------------------------------------------------
    // Fields and persistence
    // -----------------------------------------------------------------------

    #[test]
    fn dirty_flag_round_trips() {
        let mut session = session();
        let mut tree = Tree::new(oid(1));
        assert!(tree.mark_dirty());
        assert!(!tree.mark_dirty());
        tree.save(&mut session).unwrap();
        session.flush().unwrap();

        let mut loaded = Tree::get(&mut session, oid(1).as_str()).unwrap();
        assert!(loaded.is_dirty());
        let dirty: Vec<_> = Tree::dirty_objects(&session)
            .unwrap()
            .collect::<ModelResult<_>>()
            .unwrap();
        assert_eq!(dirty.len(), 1);

        loaded.clear_dirty();
        loaded.save(&mut session).unwrap();
        session.flush().unwrap();
        assert_eq!(Tree::dirty_objects(&session).unwrap().count(), 0);
    }

    #[test]
    fn stub_requires_valid_id_and_kind() {
        assert!(Blob::stub(Blob::entity_kind(), "xyz").unwrap_err().is_validation());
        assert!(Blob::stub(Tree::entity_kind(), &"a".repeat(40))
            .unwrap_err()
            .is_validation());
        let blob = Blob::stub(Blob::entity_kind(), &"a".repeat(40)).unwrap();
        assert!(blob.state().is_new());
    }

    #[test]
    fn find_matching_skips_missing() {
        let mut session = session();
        for n in [1, 3] {
            Commit::new(oid(n)).save(&mut session).unwrap();
        }
        session.flush().unwrap();
        let (a, b, c) = (oid(1), oid(2), oid(3));
        let found = Commit::find_matching(&session, [a.as_str(), b.as_str(), c.as_str()]).unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.id().clone()).collect();
        assert_eq!(ids, vec![oid(1), oid(3)]);
        assert!(Commit::exists(&session, oid(3).as_str()).unwrap());
        assert!(!Commit::exists(&session, oid(2).as_str()).unwrap());
        assert_eq!(Commit::count(&session).unwrap(), 2);
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    #[test]
    fn tree_structure_readers() {
        let mut session = session();
        let root = Tree::new(oid(1));
        let sub = Tree::new(oid(2));
        let blob = Blob::new(oid(3));
        let commit = Commit::new(oid(4));
        let module = Commit::new(oid(5));
        let tag = Tag::new(oid(6));

        root.add_blob(&mut session, &blob, "README").unwrap();
        sub.add_parent(&mut session, &root, "src").unwrap();
        root.add_commit(&mut session, &commit).unwrap();
        root.add_tag(&mut session, &tag).unwrap();
        module.add_as_submodule_of(&mut session, &root, "vendor/module").unwrap();
        session.flush().unwrap();

        let blobs: Vec<_> = root.blobs(&session).unwrap().collect::<ModelResult<_>>().unwrap();
        assert_eq!(blobs, vec![(oid(3), Some("README".to_string()))]);
        let subtrees: Vec<_> = root.subtrees(&session).unwrap().collect::<ModelResult<_>>().unwrap();
        assert_eq!(subtrees, vec![(oid(2), Some("src".to_string()))]);
        assert_eq!(sub.parents_with_names(&session).unwrap(), vec![(oid(1), "src".to_string())]);
        assert_eq!(root.commits(&session).unwrap().peers().unwrap(), vec![oid(4)]);
        assert_eq!(commit.trees(&session).unwrap().peers().unwrap(), vec![oid(1)]);
        assert_eq!(root.tags(&session).unwrap().peers().unwrap(), vec![oid(6)]);
        assert_eq!(tag.trees(&session).unwrap().peers().unwrap(), vec![oid(1)]);
        let modules: Vec<_> = root.submodules(&session).unwrap().collect::<ModelResult<_>>().unwrap();
        assert_eq!(modules, vec![(oid(5), Some("vendor/module".to_string()))]);
        let of: Vec<_> = module.submodule_of(&session).unwrap().collect::<ModelResult<_>>().unwrap();
        assert_eq!(of, vec![(oid(1), Some("vendor/module".to_string()))]);
    }

    #[test]
    fn edges_are_not_embedded_in_objects() {
        let mut session = session();
        let blob = Blob::new(oid(1));
        blob.add_parent(&mut session, &oid(2), "a.txt").unwrap();
        session.flush().unwrap();
        // The blob itself was never saved.
        assert!(!Blob::exists(&session, oid(1).as_str()).unwrap());
        assert_eq!(session.count(Relation::BlobTree.into()).unwrap(), 1);
    }

    #[test]
    fn commit_and_tag_ancestry() {
        let mut session = session();
        let child = Commit::new(oid(1));
        child.add_parents(&mut session, [&oid(2), &oid(3)]).unwrap();
        child.add_tag(&mut session, &oid(9)).unwrap();
        let tag = Tag::new(oid(10));
        tag.add_parent(&mut session, &oid(11)).unwrap();
        session.flush().unwrap();

        assert_eq!(child.parents(&session).unwrap().peers().unwrap(), vec![oid(2), oid(3)]);
        let parent = Commit::new(oid(2));
        assert_eq!(parent.children(&session).unwrap().peers().unwrap(), vec![oid(1)]);
        assert_eq!(child.tags(&session).unwrap().peers().unwrap(), vec![oid(9)]);
        assert_eq!(Tag::new(oid(9)).commits(&session).unwrap().peers().unwrap(), vec![oid(1)]);
        assert_eq!(tag.parents(&session).unwrap().peers().unwrap(), vec![oid(11)]);
        assert_eq!(Tag::new(oid(11)).children(&session).unwrap().peers().unwrap(), vec![oid(10)]);
    }

    // -----------------------------------------------------------------------
    // Repository propagation
    // -----------------------------------------------------------------------

    #[test]
    fn add_repository_recursive_walks_ancestors() {
        let mut session = session();
        // 1 -> 2 -> 3, and 1 -> 4 -> 3
        for (child, parent) in [(1, 2), (2, 3), (1, 4), (4, 3)] {
            Commit::new(oid(child)).add_parent(&mut session, &oid(parent)).unwrap();
        }
        let repo = RepositoryId::new("r1");
        let mut head = Commit::new(oid(1));
        assert_eq!(head.add_repository_recursive(&mut session, &repo).unwrap(), 4);
        session.flush().unwrap();

        for n in 1..=4 {
            let commit = Commit::get(&mut session, oid(n).as_str()).unwrap();
            assert!(commit.in_repository(&repo), "commit {n} missing repository");
        }
        // Already present: nothing to do.
        let mut again = Commit::get(&mut session, oid(1).as_str()).unwrap();
        assert_eq!(again.add_repository_recursive(&mut session, &repo).unwrap(), 0);
    }

    #[test]
    fn add_repository_recursive_stops_at_tagged_ancestor() {
        let mut session = session();
        for (child, parent) in [(1, 2), (2, 3)] {
            Commit::new(oid(child)).add_parent(&mut session, &oid(parent)).unwrap();
        }
        let repo = RepositoryId::new("r1");
        let mut middle = Commit::new(oid(2));
        assert_eq!(middle.add_repository_recursive(&mut session, &repo).unwrap(), 2);
        let mut head = Commit::new(oid(1));
        assert_eq!(head.add_repository_recursive(&mut session, &repo).unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    #[test]
    fn lookup_exact_and_prefix() {
        let mut session = session();
        let ids = ["abc0", "abc1", "abc2", "abd0", "ffff"];
        for prefix in ids {
            let id = ObjectId::parse(&format!("{prefix:0<40}")).unwrap();
            Blob::new(id).save(&mut session).unwrap();
        }
        session.flush().unwrap();

        let page = Blob::lookup_by_sha1(&session, "abc", true, 0, 10).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 3);

        let page = Blob::lookup_by_sha1(&session, "ABC", true, 1, 1).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].id().as_str().starts_with("abc1"));

        let exact = format!("{:0<40}", "abd0");
        let page = Blob::lookup_by_sha1(&session, &exact, false, 0, 10).unwrap();
        assert_eq!(page.total, 1);
        let page = Blob::lookup_by_sha1(&session, "abd", false, 0, 10).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn prefix_with_metacharacters_matches_literally() {
        let mut session = session();
        Blob::new(oid(1)).save(&mut session).unwrap();
        session.flush().unwrap();
        let page = Blob::lookup_by_sha1(&session, "0.*", true, 0, 10).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn any_object_lookup_spans_collections() {
        let mut session = session();
        let with_prefix = |n: usize| ObjectId::parse(&format!("ab{n:038x}")).unwrap();
        Blob::new(with_prefix(1)).save(&mut session).unwrap();
        Blob::new(with_prefix(2)).save(&mut session).unwrap();
        Tree::new(with_prefix(3)).save(&mut session).unwrap();
        Commit::new(with_prefix(4)).save(&mut session).unwrap();
        Tag::new(with_prefix(5)).save(&mut session).unwrap();
        Tag::new(oid(6)).save(&mut session).unwrap();
        session.flush().unwrap();

        let all = AnyObject::lookup_by_sha1(&session, "ab", true, 0, 10).unwrap();
        assert_eq!(all.total, 5);
        let kinds: Vec<_> = all.items.iter().map(AnyObject::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ObjectKind::Blob,
                ObjectKind::Blob,
                ObjectKind::Tree,
                ObjectKind::Commit,
                ObjectKind::Tag
            ]
        );

        let page = AnyObject::lookup_by_sha1(&session, "ab", true, 1, 2).unwrap();
        assert_eq!(page.total, 5);
        let ids: Vec<_> = page.items.iter().map(|o| o.id().clone()).collect();
        assert_eq!(ids, vec![with_prefix(2), with_prefix(3)]);

        let tail = AnyObject::lookup_by_sha1(&session, "ab", true, 4, 10).unwrap();
        assert_eq!(tail.items.len(), 1);
        assert_eq!(tail.items[0].kind(), ObjectKind::Tag);

        let found = AnyObject::get(&mut session, with_prefix(4).as_str()).unwrap();
        assert_eq!(found.kind(), ObjectKind::Commit);
        assert!(AnyObject::get(&mut session, oid(99).as_str()).unwrap_err().is_not_found());
    }
}
