//! Indexed repositories and their crawl bookkeeping.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gitgraph_store::{Document, Filter, Query, SortOrder, Update};
use gitgraph_types::{ObjectId, RepositoryId};
use tracing::{debug, info, warn};

use crate::canonical::IdRef;
use crate::cursor::LazyCursor;
use crate::entity::{Entity, EntityKind, EntityState, Identified, ObjectKind};
use crate::error::{ModelError, ModelResult};
use crate::field::{FieldValue, Scalar};
use crate::object::REPOSITORY_IDS_FIELD;
use crate::session::Session;
use crate::transform;

const URL_FIELD: &str = "url";
const LAST_INDEX_FIELD: &str = "last_index";
const INDEXING_FIELD: &str = "indexing";
const BEEN_INDEXED_FIELD: &str = "been_indexed";
const APPROVED_FIELD: &str = "approved";
const COUNT_FIELD: &str = "count";

/// A repository the crawler indexes.
///
/// Lifecycle: not indexed, then `indexing` while a crawl holds it, then
/// indexed with `been_indexed` set for good and `last_index` at the
/// completion time. A stale repository is claimed again on a later pass.
///
/// The plain setters are not atomic against other processes; use
/// [`Repository::claim`] and [`Repository::release`] when several
/// indexers share a store.
#[derive(Clone, Debug, PartialEq)]
pub struct Repository {
    id: RepositoryId,
    url: Scalar<String>,
    last_index: Scalar<DateTime<Utc>>,
    indexing: Scalar<bool>,
    been_indexed: Scalar<bool>,
    approved: Scalar<bool>,
    count: Scalar<u64>,
    /// Branch heads seen during the current crawl. Never stored.
    remote_heads: BTreeMap<String, ObjectId>,
    state: EntityState,
}

impl Repository {
    pub fn new(id: RepositoryId) -> Self {
        Self {
            id,
            url: Scalar::new(URL_FIELD, String::new()),
            last_index: Scalar::new(LAST_INDEX_FIELD, DateTime::<Utc>::UNIX_EPOCH),
            indexing: Scalar::new(INDEXING_FIELD, false),
            been_indexed: Scalar::new(BEEN_INDEXED_FIELD, false),
            approved: Scalar::new(APPROVED_FIELD, false),
            count: Scalar::new(COUNT_FIELD, 0),
            remote_heads: BTreeMap::new(),
            state: EntityState::fresh(),
        }
    }

    /// Load or create the repository for `url` and queue it for saving.
    ///
    /// The id is derived from the URL, so registering the same URL twice
    /// yields the same record.
    pub fn register(session: &mut Session, url: &str) -> ModelResult<Self> {
        let id = RepositoryId::from_url(url);
        let mut repository = match Self::get(session, id.as_str()) {
            Ok(repository) => repository,
            Err(e) if e.is_not_found() => Self::new(id),
            Err(e) => return Err(e),
        };
        repository.set_url(url);
        session.save(&mut repository)?;
        debug!(repository = %repository.id, url, "registered");
        Ok(repository)
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    pub fn url(&self) -> &str {
        self.url.get()
    }

    pub fn last_index(&self) -> DateTime<Utc> {
        *self.last_index.get()
    }

    pub fn is_indexing(&self) -> bool {
        *self.indexing.get()
    }

    pub fn been_indexed(&self) -> bool {
        *self.been_indexed.get()
    }

    pub fn is_approved(&self) -> bool {
        *self.approved.get()
    }

    /// Cached object count; see [`Repository::count_objects`].
    pub fn count(&self) -> u64 {
        *self.count.get()
    }

    pub fn set_url(&mut self, url: &str) -> bool {
        self.url.set(url.to_string(), self.state.changes_mut())
    }

    pub fn set_last_index(&mut self, at: DateTime<Utc>) -> bool {
        self.last_index.set(at, self.state.changes_mut())
    }

    pub fn set_indexing(&mut self, indexing: bool) -> bool {
        self.indexing.set(indexing, self.state.changes_mut())
    }

    pub fn set_been_indexed(&mut self, been_indexed: bool) -> bool {
        self.been_indexed.set(been_indexed, self.state.changes_mut())
    }

    pub fn set_approved(&mut self, approved: bool) -> bool {
        self.approved.set(approved, self.state.changes_mut())
    }

    pub fn set_count(&mut self, count: u64) -> bool {
        self.count.set(count, self.state.changes_mut())
    }

    pub fn begin_indexing(&mut self) {
        self.set_indexing(true);
    }

    /// Record a completed crawl.
    pub fn finish_indexing(&mut self, at: DateTime<Utc>) {
        let changes = self.state.changes_mut();
        self.indexing.set(false, changes);
        self.been_indexed.set(true, changes);
        self.last_index.set(at, changes);
    }

    pub fn set_remote_head(&mut self, branch: impl Into<String>, commit: ObjectId) {
        self.remote_heads.insert(branch.into(), commit);
    }

    pub fn remote_heads(&self) -> &BTreeMap<String, ObjectId> {
        &self.remote_heads
    }

    pub fn save(&mut self, session: &mut Session) -> ModelResult<()> {
        session.save(self)
    }

    // ---- Queries ----

    pub fn get(session: &mut Session, id: &str) -> ModelResult<Self> {
        session.get(EntityKind::Repository, id)
    }

    pub fn get_or_create(session: &mut Session, id: &str) -> ModelResult<Self> {
        session.get_or_create(EntityKind::Repository, id)
    }

    pub fn all(session: &Session) -> ModelResult<LazyCursor<Self>> {
        session.find(EntityKind::Repository, &Query::new(Filter::All))
    }

    /// The crawl work queue: approved repositories not being indexed whose
    /// last completed crawl is older than `cutoff`. Without a cutoff every
    /// approved, idle repository qualifies.
    pub fn get_indexed_before(
        session: &Session,
        cutoff: Option<DateTime<Utc>>,
    ) -> ModelResult<LazyCursor<Self>> {
        let mut filter = Filter::eq(APPROVED_FIELD, true).and(Filter::eq(INDEXING_FIELD, false));
        if let Some(cutoff) = cutoff {
            filter = filter.and(Filter::lt(LAST_INDEX_FIELD, cutoff.to_value()));
        }
        session.find(EntityKind::Repository, &Query::new(filter))
    }

    /// Repositories ranked by their cached object count.
    pub fn get_by_highest_count(
        session: &Session,
        limit: Option<usize>,
        descending: bool,
    ) -> ModelResult<LazyCursor<Self>> {
        let order = if descending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        let mut query = Query::new(Filter::All).sort_by(COUNT_FIELD, order);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        session.find(EntityKind::Repository, &query)
    }

    /// Recompute `count` by scanning every object collection for this
    /// repository's id, then queue the new value for saving.
    pub fn count_objects(&mut self, session: &mut Session) -> ModelResult<u64> {
        let filter = Filter::contains(REPOSITORY_IDS_FIELD, self.id.as_str());
        let mut total = 0;
        for kind in ObjectKind::ALL {
            total += session.count_matching(kind.into(), &filter)?;
        }
        self.set_count(total);
        session.save(self)?;
        debug!(repository = %self.id, count = total, "objects recounted");
        Ok(total)
    }

    /// Atomically mark a stored repository as being indexed.
    ///
    /// Succeeds only if the repository is approved and not already being
    /// indexed. Returns `false` when another claimant got there first or
    /// the repository is not stored.
    pub fn claim(session: &mut Session, id: &str) -> ModelResult<bool> {
        let guard = Filter::eq(INDEXING_FIELD, false).and(Filter::eq(APPROVED_FIELD, true));
        let update = Update::new().set(INDEXING_FIELD, true);
        let claimed = session.update_if(EntityKind::Repository, id, &guard, &update)?;
        if claimed {
            info!(repository = id, "indexing claimed");
        } else {
            warn!(repository = id, "indexing claim lost");
        }
        Ok(claimed)
    }

    /// Atomically end a claimed crawl completed at `at`.
    pub fn release(session: &mut Session, id: &str, at: DateTime<Utc>) -> ModelResult<bool> {
        let guard = Filter::eq(INDEXING_FIELD, true);
        let update = Update::new()
            .set(INDEXING_FIELD, false)
            .set(BEEN_INDEXED_FIELD, true)
            .set(LAST_INDEX_FIELD, at.to_value());
        let released = session.update_if(EntityKind::Repository, id, &guard, &update)?;
        if released {
            info!(repository = id, at = %at, "indexing released");
        } else {
            warn!(repository = id, "release without a claim");
        }
        Ok(released)
    }
}

impl<'a> From<&'a Repository> for IdRef<'a> {
    fn from(repository: &'a Repository) -> Self {
        IdRef::Entity(repository)
    }
}

impl Identified for Repository {
    fn id_str(&self) -> &str {
        self.id.as_str()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Repository
    }
}

impl Entity for Repository {
    fn state(&self) -> &EntityState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn stub(kind: EntityKind, id: &str) -> ModelResult<Self> {
        check_kind(kind)?;
        if id.is_empty() {
            return Err(ModelError::Validation("repository id must not be empty".into()));
        }
        Ok(Self::new(RepositoryId::new(id)))
    }

    fn load(kind: EntityKind, doc: &Document) -> ModelResult<Self> {
        check_kind(kind)?;
        let id = RepositoryId::new(transform::require_id(doc)?);
        Ok(Self {
            id,
            url: Scalar::load(URL_FIELD, doc, String::new())?,
            last_index: Scalar::load(LAST_INDEX_FIELD, doc, DateTime::<Utc>::UNIX_EPOCH)?,
            indexing: Scalar::load(INDEXING_FIELD, doc, false)?,
            been_indexed: Scalar::load(BEEN_INDEXED_FIELD, doc, false)?,
            approved: Scalar::load(APPROVED_FIELD, doc, false)?,
            count: Scalar::load(COUNT_FIELD, doc, 0)?,
            remote_heads: BTreeMap::new(),
            state: EntityState::stored(),
        })
    }

    fn fields(&self) -> Document {
        let mut doc = Document::new();
        self.url.write(&mut doc);
        self.last_index.write(&mut doc);
        self.indexing.write(&mut doc);
        self.been_indexed.write(&mut doc);
        self.approved.write(&mut doc);
        self.count.write(&mut doc);
        doc
    }
}

fn check_kind(kind: EntityKind) -> ModelResult<()> {
    if kind != EntityKind::Repository {
        return Err(ModelError::Validation(format!(
            "{kind} record cannot be read as a repository"
        )));
    }
    Ok(())
}
