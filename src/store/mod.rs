//! Component store: one repository per component kind over the generic
//! `KvIndex`, obeying the branch-visibility semantics the version-control
//! helper computes (spec §4, "Component store").

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::branch::BranchCriteria;
use crate::commit::Commit;
use crate::error::Result;
use crate::ids::{ComponentId, MemberId};
use crate::kv::{FieldValue, Indexable, KvIndex, Page, PageRequest, Query};
use crate::model::{
    Component, Concept, ComponentVersion, Description, QueryConcept, ReferenceSetMember,
    Relationship, Timepoint,
};

/// A component that can be stored: it has a stable id (independent of the
/// numeric/UUID split between components and refset members) and carries
/// the common `ComponentVersion` envelope.
pub trait VersionedEntity: Component + Indexable + Clone {
    type Id: Ord + Clone + Hash + Eq + Debug + Send + Sync + 'static;
    fn entity_id(&self) -> Self::Id;
}

impl VersionedEntity for Concept {
    type Id = ComponentId;
    fn entity_id(&self) -> ComponentId {
        self.concept_id
    }
}
impl VersionedEntity for Description {
    type Id = ComponentId;
    fn entity_id(&self) -> ComponentId {
        self.description_id
    }
}
impl VersionedEntity for Relationship {
    type Id = ComponentId;
    fn entity_id(&self) -> ComponentId {
        self.relationship_id
    }
}
impl VersionedEntity for ReferenceSetMember {
    type Id = MemberId;
    fn entity_id(&self) -> MemberId {
        self.member_id
    }
}

/// Document key: (entity id, branch, version start). Unique per invariant
/// "single visible version" since only one row may have a given
/// (id, path, start).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionKey<Id: Ord + Clone>(pub Id, pub String, pub Timepoint);

impl Indexable for Concept {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "path" => Some(self.version.path.as_str().to_string().into()),
            "start" => Some(self.version.start.into()),
            "end" => self.version.end.map(FieldValue::from),
            "end_absent" => Some(self.version.end.is_none().into()),
            "active" => Some(self.version.active.into()),
            "deleted" => Some(self.version.deleted.into()),
            "id" => Some(self.concept_id.to_string().into()),
            _ => None,
        }
    }
}

impl Indexable for Relationship {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "path" => Some(self.version.path.as_str().to_string().into()),
            "start" => Some(self.version.start.into()),
            "end" => self.version.end.map(FieldValue::from),
            "end_absent" => Some(self.version.end.is_none().into()),
            "active" => Some(self.version.active.into()),
            "deleted" => Some(self.version.deleted.into()),
            "id" => Some(self.relationship_id.to_string().into()),
            "source_id" => Some(self.source_id.to_string().into()),
            "destination_id" => Some(self.destination_id.to_string().into()),
            "type_id" => Some(self.type_id.to_string().into()),
            _ => None,
        }
    }
}

impl Indexable for Description {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "path" => Some(self.version.path.as_str().to_string().into()),
            "start" => Some(self.version.start.into()),
            "end" => self.version.end.map(FieldValue::from),
            "end_absent" => Some(self.version.end.is_none().into()),
            "active" => Some(self.version.active.into()),
            "deleted" => Some(self.version.deleted.into()),
            "id" => Some(self.description_id.to_string().into()),
            "concept_id" => Some(self.concept_id.to_string().into()),
            _ => None,
        }
    }
}

impl Indexable for ReferenceSetMember {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "path" => Some(self.version.path.as_str().to_string().into()),
            "start" => Some(self.version.start.into()),
            "end" => self.version.end.map(FieldValue::from),
            "end_absent" => Some(self.version.end.is_none().into()),
            "active" => Some(self.version.active.into()),
            "deleted" => Some(self.version.deleted.into()),
            "id" => Some(self.member_id.to_string().into()),
            "referenced_component_id" => Some(self.referenced_component_id.to_string().into()),
            "refset_id" => Some(self.refset_id.to_string().into()),
            _ => None,
        }
    }
}

impl Indexable for QueryConcept {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "path" => Some(self.path.as_str().to_string().into()),
            "concept_id" => Some(self.concept_id.to_string().into()),
            "stated" => Some(self.stated.into()),
            _ => None,
        }
    }
}

/// A per-component-type repository. Generic over any `VersionedEntity`, so
/// Concept/Description/Relationship/ReferenceSetMember all share the same
/// branch-visibility logic instead of reimplementing it four times.
pub struct Repository<T: VersionedEntity> {
    index: Arc<dyn KvIndex<VersionKey<T::Id>, T>>,
}

impl<T: VersionedEntity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Repository {
            index: self.index.clone(),
        }
    }
}

impl<T: VersionedEntity> Repository<T> {
    pub fn new(index: Arc<dyn KvIndex<VersionKey<T::Id>, T>>) -> Self {
        Repository { index }
    }

    /// Returns every version visible under `criteria`, deduplicated by
    /// entity id with nearer-branch versions shadowing farther ones
    /// (invariant "Branch visibility" / "Shadowing").
    pub fn visible_set(&self, criteria: &BranchCriteria) -> Result<Vec<T>> {
        let rows = self.index.scan(&criteria.to_query())?;
        let priority: HashMap<&str, usize> = criteria
            .paths_by_priority()
            .into_iter()
            .enumerate()
            .map(|(i, p)| (p.as_str(), i))
            .collect();

        let mut best: HashMap<T::Id, (usize, T)> = HashMap::new();
        for row in rows {
            if row.version().deleted {
                continue;
            }
            let path = row.version().path.as_str();
            let Some(&rank) = priority.get(path) else {
                continue;
            };
            let id = row.entity_id();
            match best.get(&id) {
                Some((existing_rank, _)) if *existing_rank <= rank => {}
                _ => {
                    best.insert(id, (rank, row));
                }
            }
        }
        Ok(best.into_values().map(|(_, row)| row).collect())
    }

    pub fn find(&self, criteria: &BranchCriteria, id: &T::Id) -> Result<Option<T>> {
        Ok(self
            .visible_set(criteria)?
            .into_iter()
            .find(|row| &row.entity_id() == id))
    }

    pub fn find_many(&self, criteria: &BranchCriteria, ids: &[T::Id]) -> Result<HashMap<T::Id, T>> {
        Ok(self
            .visible_set(criteria)?
            .into_iter()
            .filter(|row| ids.contains(&row.entity_id()))
            .map(|row| (row.entity_id(), row))
            .collect())
    }

    /// Writes a new version at the commit's timepoint. The caller is
    /// responsible for closing out any superseded version beforehand via
    /// `supersede`.
    pub fn write(&self, commit: &Commit, mut entity: T) -> Result<T> {
        let env = entity.version_mut();
        env.path = commit.path().clone();
        env.start = commit.timepoint();
        env.end = None;
        let key = VersionKey(entity.entity_id(), commit.path().as_str().to_string(), commit.timepoint());
        self.index.bulk_upsert(vec![(key, entity.clone())])?;
        Ok(entity)
    }

    /// Stamps `end` on the previously-current version of `id` on `path`,
    /// so it stops being visible from `end` onward. A no-op if there is no
    /// current version (the entity is new on this branch).
    pub fn supersede(&self, path: &str, id: &T::Id, previous_start: Timepoint, end: Timepoint) -> Result<()> {
        let key = VersionKey(id.clone(), path.to_string(), previous_start);
        if let Some(mut existing) = self.index.get(&key)? {
            existing.version_mut().end = Some(end);
            self.index.bulk_upsert(vec![(key, existing)])?;
        }
        Ok(())
    }

    /// Removes version rows outright — used to compact orphaned rows from
    /// rolled-back commits, or to hard-delete an unreleased component on
    /// its own authoring branch (spec §3 Lifecycle).
    pub fn remove(&self, path: &str, id: &T::Id, start: Timepoint) -> Result<()> {
        self.index.bulk_delete(&[VersionKey(id.clone(), path.to_string(), start)])
    }

    pub fn page(&self, criteria: &BranchCriteria, extra: &Query, page: PageRequest) -> Result<Page<T>> {
        let query = Query::and([criteria.to_query(), extra.clone()]);
        self.index.search(&query, page)
    }

    /// Visible rows whose `field` is one of `values`, fetched in chunks of
    /// at most `clause_limit` values per underlying query — the update
    /// pipeline's way of honoring spec §5's clause-count cap when loading
    /// the existing view for a large batch of incoming concepts.
    pub fn find_by_field_in(
        &self,
        criteria: &BranchCriteria,
        field: &'static str,
        values: Vec<FieldValue>,
        clause_limit: usize,
    ) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for chunk in values.chunks(clause_limit.max(1)) {
            let query = Query::and([criteria.to_query(), Query::TermsIn(field, chunk.to_vec())]);
            out.extend(self.index.scan(&query)?);
        }
        Ok(out)
    }
}

/// Replays every version `child` authored (visible at the child's own
/// head, ignoring its ancestors) onto `parent_criteria`'s nearest path at
/// `new_timepoint`, superseding whatever was previously visible there for
/// each touched id, then removes the child's own rows so a subsequent read
/// on the child — whose base/head the registry has already reset to
/// `new_timepoint` — falls through to the freshly-promoted parent state
/// instead of re-shadowing it with its own stale rows (spec §4.1
/// `promote`: "replays the branch's changes onto the parent ... empties
/// the child").
pub fn promote_repository<T: VersionedEntity>(
    repo: &Repository<T>,
    child: &crate::model::Branch,
    parent_criteria: &BranchCriteria,
    new_timepoint: Timepoint,
) -> Result<usize> {
    let parent_path = parent_criteria
        .paths_by_priority()
        .into_iter()
        .next()
        .expect("parent criteria always has at least its own clause")
        .clone();
    let child_only = BranchCriteria::for_branch(child, &[]);
    let child_rows = repo.visible_set(&child_only)?;
    let mut promoted = 0;
    for mut entity in child_rows {
        let id = entity.entity_id();
        let authored_start = entity.version().start;

        if let Some(existing_parent) = repo.find(parent_criteria, &id)? {
            let prev_path = existing_parent.version().path.as_str().to_string();
            let prev_start = existing_parent.version().start;
            repo.supersede(&prev_path, &id, prev_start, new_timepoint)?;
        }

        let env = entity.version_mut();
        env.path = parent_path.clone();
        env.start = new_timepoint;
        env.end = None;
        let key = VersionKey(id.clone(), parent_path.as_str().to_string(), new_timepoint);
        repo.index.bulk_upsert(vec![(key, entity)])?;

        repo.remove(child.path.as_str(), &id, authored_start)?;
        promoted += 1;
    }
    Ok(promoted)
}

/// Tally of rows replayed per component kind by a full-store promote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromoteSummary {
    pub concepts: usize,
    pub descriptions: usize,
    pub relationships: usize,
    pub members: usize,
}

impl PromoteSummary {
    pub fn total(&self) -> usize {
        self.concepts + self.descriptions + self.relationships + self.members
    }
}

/// Full-store promote: replays every repository's child-authored rows onto
/// the parent. Call `BranchRegistry::promote` first to obtain
/// `(child_before, parent_before, new_timepoint)` under the branch lock,
/// then this function to replay the actual component data — the registry
/// call alone only moves branch pointers (spec §4.1).
pub fn promote(
    store: &ComponentStore,
    child_before: &crate::model::Branch,
    parent_before: &crate::model::Branch,
    parent_ancestors: &[crate::model::Branch],
    new_timepoint: Timepoint,
) -> Result<PromoteSummary> {
    let parent_criteria = BranchCriteria::for_branch(parent_before, parent_ancestors);
    Ok(PromoteSummary {
        concepts: promote_repository(&store.concepts, child_before, &parent_criteria, new_timepoint)?,
        descriptions: promote_repository(
            &store.descriptions,
            child_before,
            &parent_criteria,
            new_timepoint,
        )?,
        relationships: promote_repository(
            &store.relationships,
            child_before,
            &parent_criteria,
            new_timepoint,
        )?,
        members: promote_repository(&store.members, child_before, &parent_criteria, new_timepoint)?,
    })
}

/// Removes rows written during a rolled-back commit (spec §4.3:
/// "orphaned rows ... become invisible ... a compactor removes them
/// lazily"). Exposed as an explicit operation rather than an implicit
/// background sweep, since callers need to know it ran.
pub fn compact_orphans<T: VersionedEntity>(
    repo: &Repository<T>,
    path: &str,
    orphaned: &[(T::Id, Timepoint)],
) -> Result<usize> {
    let mut removed = 0;
    for (id, start) in orphaned {
        repo.remove(path, id, *start)?;
        removed += 1;
    }
    Ok(removed)
}

/// The four component repositories bundled together, plus the
/// already-assigned-identifiers ledger the pipeline persists at step 12.
pub struct ComponentStore {
    pub concepts: Repository<Concept>,
    pub descriptions: Repository<Description>,
    pub relationships: Repository<Relationship>,
    pub members: Repository<ReferenceSetMember>,
}

impl ComponentStore {
    pub fn new_in_memory() -> Self {
        use crate::kv::InMemoryKvIndex;
        ComponentStore {
            concepts: Repository::new(Arc::new(InMemoryKvIndex::new())),
            descriptions: Repository::new(Arc::new(InMemoryKvIndex::new())),
            relationships: Repository::new(Arc::new(InMemoryKvIndex::new())),
            members: Repository::new(Arc::new(InMemoryKvIndex::new())),
        }
    }
}
