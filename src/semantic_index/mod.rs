//! Incremental transitive-closure maintainer over ISA edges, per branch and
//! per form (stated/inferred) — spec §4.5. Operates purely on an
//! already-resolved view of active relationships handed to it by the
//! pipeline/store layer; it has no opinion about branch visibility itself.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::ids::ComponentId;
use crate::kv::{FieldValue, Indexable, InMemoryKvIndex, KvIndex, Query};
use crate::model::{BranchPath, CharacteristicType, QueryConcept, Relationship, ISA_TYPE_ID};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryConceptKey(pub ComponentId, pub String, pub bool);

/// The semantic index maintainer: one logical table of `QueryConcept` rows
/// keyed by (conceptId, branch, form), shared across branches and forms —
/// exactly as the KV index backing it would be in production.
pub struct SemanticIndex {
    rows: Arc<dyn KvIndex<QueryConceptKey, QueryConcept>>,
}

impl Default for SemanticIndex {
    fn default() -> Self {
        SemanticIndex {
            rows: Arc::new(InMemoryKvIndex::new()),
        }
    }
}

/// Extracts the direct-parent ISA edges for every concept appearing as a
/// relationship source, from the authoritative active relationship set for
/// one form.
fn parents_by_concept(relationships: &[Relationship], stated: bool) -> HashMap<ComponentId, Vec<ComponentId>> {
    let wanted = if stated {
        CharacteristicType::Stated
    } else {
        CharacteristicType::Inferred
    };
    let mut out: HashMap<ComponentId, Vec<ComponentId>> = HashMap::new();
    for rel in relationships {
        if !rel.version.active || rel.type_id.0 != ISA_TYPE_ID || rel.characteristic_type != wanted {
            continue;
        }
        out.entry(rel.source_id).or_default().push(rel.destination_id);
    }
    out
}

/// Kahn's algorithm restricted to `nodes`, treating edges to parents
/// outside the set as already resolved. Returns the topological order and,
/// separately, any nodes left over because they sit on a cycle.
fn topo_order(
    nodes: &[ComponentId],
    parents_of: &HashMap<ComponentId, Vec<ComponentId>>,
) -> (Vec<ComponentId>, Vec<ComponentId>) {
    let node_set: HashSet<ComponentId> = nodes.iter().copied().collect();
    let mut in_degree: HashMap<ComponentId, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let mut children_of: HashMap<ComponentId, Vec<ComponentId>> = HashMap::new();

    for &n in nodes {
        for &p in parents_of.get(&n).map(Vec::as_slice).unwrap_or(&[]) {
            if node_set.contains(&p) {
                *in_degree.get_mut(&n).unwrap() += 1;
                children_of.entry(p).or_default().push(n);
            }
        }
    }

    let mut queue: VecDeque<ComponentId> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    let mut seen: HashSet<ComponentId> = HashSet::new();

    while let Some(n) = queue.pop_front() {
        order.push(n);
        seen.insert(n);
        if let Some(children) = children_of.get(&n) {
            for &c in children {
                let d = in_degree.get_mut(&c).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push_back(c);
                }
            }
        }
    }

    let remaining: Vec<ComponentId> = nodes.iter().copied().filter(|n| !seen.contains(n)).collect();
    (order, remaining)
}

impl SemanticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &BranchPath, concept_id: ComponentId, stated: bool) -> Result<Option<QueryConcept>> {
        self.rows.get(&QueryConceptKey(concept_id, path.as_str().to_string(), stated))
    }

    fn put(&self, qc: QueryConcept) -> Result<()> {
        let key = QueryConceptKey(qc.concept_id, qc.path.as_str().to_string(), qc.stated);
        self.rows.bulk_upsert(vec![(key, qc)])
    }

    /// All rows on a branch for one form — used by the ECL planner and by
    /// descendant discovery during incremental updates.
    pub fn all(&self, path: &BranchPath, stated: bool) -> Result<Vec<QueryConcept>> {
        let query = Query::and([
            Query::Term("path", FieldValue::Str(path.as_str().to_string())),
            Query::Term("stated", FieldValue::Bool(stated)),
        ]);
        self.rows.scan(&query)
    }

    /// Step 2 of spec §4.5: concepts whose ancestor set currently contains
    /// a dirty concept, found by walking the existing (pre-update) index.
    fn affected_descendants(&self, path: &BranchPath, stated: bool, dirty: &HashSet<ComponentId>) -> Result<HashSet<ComponentId>> {
        let mut out = dirty.clone();
        for row in self.all(path, stated)? {
            if row.ancestors.iter().any(|a| dirty.contains(a)) {
                out.insert(row.concept_id);
            }
        }
        Ok(out)
    }

    /// Incremental update (spec §4.5 steps 1-5). `dirty` is the set of
    /// concepts whose direct ISA parent set changed in this commit;
    /// `relationships` is the authoritative active relationship set for
    /// `path` (already resolved through branch visibility by the caller).
    #[tracing::instrument(skip(self, relationships))]
    pub fn incremental_update(
        &self,
        path: &BranchPath,
        stated: bool,
        dirty: &HashSet<ComponentId>,
        relationships: &[Relationship],
    ) -> Result<()> {
        if dirty.is_empty() {
            return Ok(());
        }
        let affected = self.affected_descendants(path, stated, dirty)?;
        let parents_map = parents_by_concept(relationships, stated);

        let affected_vec: Vec<ComponentId> = affected.iter().copied().collect();
        let (order, cyclic) = topo_order(&affected_vec, &parents_map);
        if !cyclic.is_empty() {
            warn!(?cyclic, branch = %path, "ISA cycle detected during incremental update");
            return Err(StoreError::CycleDetected(cyclic));
        }

        for concept_id in order {
            let parents: HashSet<ComponentId> = parents_map
                .get(&concept_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            let mut ancestors = HashSet::new();
            for p in &parents {
                ancestors.insert(*p);
                if let Some(parent_row) = self.get(path, *p, stated)? {
                    ancestors.extend(parent_row.ancestors.iter().copied());
                }
            }
            if ancestors.contains(&concept_id) {
                return Err(StoreError::CycleDetected(vec![concept_id]));
            }
            let mut qc = QueryConcept::new(concept_id, path.clone(), stated);
            qc.parents = parents;
            qc.ancestors = ancestors;
            self.put(qc)?;
        }
        Ok(())
    }

    /// Full rebuild: recomputes the index for `path`/`stated` from
    /// scratch, processing concepts in topological (roots-first) order.
    /// Fails `CycleDetected` on any cycle in the whole graph.
    #[tracing::instrument(skip(self, all_concepts, relationships))]
    pub fn full_rebuild(
        &self,
        path: &BranchPath,
        stated: bool,
        all_concepts: &[ComponentId],
        relationships: &[Relationship],
    ) -> Result<()> {
        let existing = self.all(path, stated)?;
        let keys: Vec<QueryConceptKey> = existing
            .iter()
            .map(|qc| QueryConceptKey(qc.concept_id, path.as_str().to_string(), stated))
            .collect();
        self.rows.bulk_delete(&keys)?;

        let parents_map = parents_by_concept(relationships, stated);
        let (order, cyclic) = topo_order(all_concepts, &parents_map);
        if !cyclic.is_empty() {
            warn!(?cyclic, branch = %path, "ISA cycle detected during full rebuild");
            return Err(StoreError::CycleDetected(cyclic));
        }

        for concept_id in order {
            let parents: HashSet<ComponentId> = parents_map
                .get(&concept_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            let mut ancestors = HashSet::new();
            for p in &parents {
                ancestors.insert(*p);
                if let Some(parent_row) = self.get(path, *p, stated)? {
                    ancestors.extend(parent_row.ancestors.iter().copied());
                }
            }
            let mut qc = QueryConcept::new(concept_id, path.clone(), stated);
            qc.parents = parents;
            qc.ancestors = ancestors;
            self.put(qc)?;
        }
        info!(branch = %path, stated, concepts = all_concepts.len(), "semantic index rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComponentVersion;

    fn isa(id: u64, source: u64, dest: u64) -> Relationship {
        Relationship {
            relationship_id: ComponentId(id),
            source_id: ComponentId(source),
            destination_id: ComponentId(dest),
            type_id: ComponentId(ISA_TYPE_ID),
            group: 0,
            characteristic_type: CharacteristicType::Stated,
            modifier_id: ComponentId(900000000000451002),
            version: ComponentVersion {
                path: BranchPath::main(),
                start: 1,
                end: None,
                active: true,
                module_id: ComponentId(900000000000207008),
                effective_time: None,
                release_hash: None,
                released_effective_time: None,
                deleted: false,
            },
        }
    }

    #[test]
    fn closure_over_diamond() {
        // B->A, C->B, D->A  (arrow = child -> parent)
        let rels = vec![isa(1, 2, 1), isa(2, 3, 2), isa(3, 4, 1)];
        let index = SemanticIndex::new();
        let path = BranchPath::main();
        let dirty: HashSet<_> = [1, 2, 3, 4].into_iter().map(ComponentId).collect();
        index.incremental_update(&path, true, &dirty, &rels).unwrap();

        let b = index.get(&path, ComponentId(2), true).unwrap().unwrap();
        assert_eq!(b.ancestors, [ComponentId(1)].into_iter().collect());

        let c = index.get(&path, ComponentId(3), true).unwrap().unwrap();
        assert_eq!(c.ancestors, [ComponentId(1), ComponentId(2)].into_iter().collect());

        let d = index.get(&path, ComponentId(4), true).unwrap().unwrap();
        assert_eq!(d.ancestors, [ComponentId(1)].into_iter().collect());
    }

    #[test]
    fn cycle_is_rejected() {
        let rels = vec![isa(1, 1, 2), isa(2, 2, 1)];
        let index = SemanticIndex::new();
        let path = BranchPath::main();
        let dirty: HashSet<_> = [1, 2].into_iter().map(ComponentId).collect();
        let err = index.incremental_update(&path, true, &dirty, &rels).unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected(_)));
    }

    #[test]
    fn full_rebuild_matches_incremental() {
        let rels = vec![isa(1, 2, 1), isa(2, 3, 2), isa(3, 4, 1)];
        let index = SemanticIndex::new();
        let path = BranchPath::main();
        let all: Vec<_> = [1, 2, 3, 4].into_iter().map(ComponentId).collect();
        index.full_rebuild(&path, true, &all, &rels).unwrap();
        let c = index.get(&path, ComponentId(3), true).unwrap().unwrap();
        assert_eq!(c.ancestors, [ComponentId(1), ComponentId(2)].into_iter().collect());
    }
}
