//! End-to-end scenarios over the public API: author two concepts through
//! the update pipeline, feed the resulting ISA edge to the semantic index,
//! then resolve an ECL descendant query against it. Mirrors spec §8's
//! S1 (create+fetch with axiom-driven definition status) and S3
//! (descendant-of query) chained together.

use std::collections::HashSet;

use snowcore::branch::{BranchCriteria, BranchRegistry, InMemoryBranchRegistry};
use snowcore::cancel::CancellationToken;
use snowcore::commit::Outcome;
use snowcore::config::StoreConfig;
use snowcore::ecl::{execute, EclContext, Expr, SubExpr, SubOp};
use snowcore::ids::{build_sctid, ComponentId, ComponentKind};
use snowcore::kv::PageRequest;
use snowcore::model::BranchPath;
use snowcore::pipeline::axioms::{ClassAxiom, ReferenceAxiomConverter};
use snowcore::pipeline::identifiers::SequentialIdentifierService;
use snowcore::pipeline::input::{ConceptInput, DescriptionInput};
use snowcore::pipeline::UpdatePipeline;
use snowcore::semantic_index::SemanticIndex;
use snowcore::store::ComponentStore;

const FSN: u64 = 900000000000003001;
const MODULE: u64 = 900000000000207008;

#[test]
fn create_axiom_parented_concept_then_resolve_descendant_query() {
    let store = ComponentStore::new_in_memory();
    let registry = InMemoryBranchRegistry::new();
    let id_service = SequentialIdentifierService::new();
    let converter = ReferenceAxiomConverter;
    let config = StoreConfig::default();
    let pipeline = UpdatePipeline::new(&store, &id_service, &converter, &config);

    let root_id = build_sctid(ComponentKind::Concept, 1);
    let child_id = build_sctid(ComponentKind::Concept, 2);

    let mut root = ConceptInput::new(ComponentId(MODULE));
    root.concept_id = Some(root_id);
    root.descriptions.push(DescriptionInput::new(
        "Clinical finding (finding)",
        "en",
        ComponentId(FSN),
        ComponentId(MODULE),
    ));

    let mut child = ConceptInput::new(ComponentId(MODULE));
    child.concept_id = Some(child_id);
    child.descriptions.push(DescriptionInput::new(
        "Headache (finding)",
        "en",
        ComponentId(FSN),
        ComponentId(MODULE),
    ));
    child.class_axioms.push(ClassAxiom {
        parents: vec![root_id],
        roles: vec![],
        is_gci: false,
    });

    let main = registry.find(&BranchPath::main()).unwrap().unwrap();
    let mut commit = registry.open_commit(&BranchPath::main()).unwrap();
    let criteria = BranchCriteria::including_open_commit(&main, &[], &commit);

    let (output, index_deltas) = pipeline
        .save_batch(&mut commit, &criteria, vec![root.clone(), child.clone()])
        .unwrap();

    assert_eq!(output.concepts.len(), 2);
    let saved_child = output.concepts.iter().find(|c| c.concept_id == child_id).unwrap();
    assert_eq!(saved_child.definition_status_id, snowcore::model::DefinitionStatus::FullyDefined);
    let saved_root = output.concepts.iter().find(|c| c.concept_id == root_id).unwrap();
    assert_eq!(saved_root.definition_status_id, snowcore::model::DefinitionStatus::Primitive);

    assert!(index_deltas.contains(&(child_id, true)));

    let active_rels: Vec<_> = output.relationships.iter().filter(|r| r.version.active).cloned().collect();
    assert_eq!(active_rels.len(), 1);
    assert_eq!(active_rels[0].destination_id, root_id);

    let semantic_index = SemanticIndex::new();
    let dirty: HashSet<ComponentId> = index_deltas.into_iter().filter(|(_, stated)| *stated).map(|(id, _)| id).collect();
    semantic_index
        .incremental_update(&BranchPath::main(), true, &dirty, &active_rels)
        .unwrap();

    registry.close_commit(commit, Outcome::Success).unwrap();

    let all_concepts = vec![root_id, child_id];
    let ctx = EclContext {
        semantic_index: &semantic_index,
        path: BranchPath::main(),
        stated: true,
        relationships: &active_rels,
        all_concepts: &all_concepts,
    };
    let expr = Expr::Sub(SubExpr::id(SubOp::DescendantOrSelf, root_id));
    let cancel = CancellationToken::new();
    let page = execute(&expr, &ctx, PageRequest::first(10), &cancel).unwrap();
    assert_eq!(page.items, vec![root_id, child_id]);
}

#[test]
fn out_of_band_axiom_member_deletion_flips_definition_status_on_read() {
    let store = ComponentStore::new_in_memory();
    let registry = InMemoryBranchRegistry::new();
    let id_service = SequentialIdentifierService::new();
    let converter = ReferenceAxiomConverter;
    let config = StoreConfig::default();
    let pipeline = UpdatePipeline::new(&store, &id_service, &converter, &config);

    let concept_id = build_sctid(ComponentKind::Concept, 3);
    let parent_id = build_sctid(ComponentKind::Concept, 4);
    let mut input = ConceptInput::new(ComponentId(MODULE));
    input.concept_id = Some(concept_id);
    input.class_axioms.push(ClassAxiom {
        parents: vec![parent_id],
        roles: vec![],
        is_gci: false,
    });

    let main = registry.find(&BranchPath::main()).unwrap().unwrap();
    let mut commit = registry.open_commit(&BranchPath::main()).unwrap();
    let criteria = BranchCriteria::including_open_commit(&main, &[], &commit);
    pipeline.save_batch(&mut commit, &criteria, vec![input]).unwrap();
    registry.close_commit(commit, Outcome::Success).unwrap();

    let main = registry.find(&BranchPath::main()).unwrap().unwrap();
    let read_criteria = BranchCriteria::for_branch(&main, &[]);
    let view = snowcore::pipeline::find(&store, &read_criteria, concept_id).unwrap().unwrap();
    assert_eq!(view.concept.definition_status_id, snowcore::model::DefinitionStatus::FullyDefined);

    for member in &view.owl_axiom_members {
        store
            .members
            .supersede(BranchPath::main().as_str(), &member.member_id, member.version.start, member.version.start)
            .unwrap();
    }

    let view_after = snowcore::pipeline::find(&store, &read_criteria, concept_id).unwrap().unwrap();
    assert_eq!(view_after.concept.definition_status_id, snowcore::model::DefinitionStatus::Primitive);
}

#[test]
fn promote_moves_a_task_branch_concept_onto_main() {
    let store = ComponentStore::new_in_memory();
    let registry = InMemoryBranchRegistry::new();
    let id_service = SequentialIdentifierService::new();
    let converter = ReferenceAxiomConverter;
    let config = StoreConfig::default();
    let pipeline = UpdatePipeline::new(&store, &id_service, &converter, &config);

    let task_path = BranchPath::new("MAIN/TASK");
    registry.create(task_path.clone()).unwrap();

    let concept_id = build_sctid(ComponentKind::Concept, 5);
    let mut input = ConceptInput::new(ComponentId(MODULE));
    input.concept_id = Some(concept_id);
    input.descriptions.push(DescriptionInput::new(
        "Migraine (finding)",
        "en",
        ComponentId(FSN),
        ComponentId(MODULE),
    ));

    let task_branch = registry.find(&task_path).unwrap().unwrap();
    let mut commit = registry.open_commit(&task_path).unwrap();
    let criteria = BranchCriteria::including_open_commit(&task_branch, &[], &commit);
    pipeline.save_batch(&mut commit, &criteria, vec![input]).unwrap();
    registry.close_commit(commit, Outcome::Success).unwrap();

    // Not yet visible on MAIN.
    let main_before = registry.find(&BranchPath::main()).unwrap().unwrap();
    let on_main_before = BranchCriteria::for_branch(&main_before, &[]);
    assert!(snowcore::pipeline::find(&store, &on_main_before, concept_id)
        .unwrap()
        .is_none());

    let (child_before, parent_before, new_timepoint) = registry.promote(&task_path).unwrap();
    let parent_ancestors = registry.ancestor_branches(&parent_before.path).unwrap();
    let summary = snowcore::store::promote(&store, &child_before, &parent_before, &parent_ancestors, new_timepoint).unwrap();
    assert_eq!(summary.concepts, 1);
    assert_eq!(summary.descriptions, 1);

    let main_after = registry.find(&BranchPath::main()).unwrap().unwrap();
    let on_main_after = BranchCriteria::for_branch(&main_after, &[]);
    let promoted = snowcore::pipeline::find(&store, &on_main_after, concept_id).unwrap().unwrap();
    assert_eq!(promoted.concept.version.path, BranchPath::main());
    assert_eq!(promoted.descriptions.len(), 1);

    // The task branch is now empty: it sees the promoted MAIN version, not
    // a stale row of its own.
    let task_after = registry.find(&task_path).unwrap().unwrap();
    let on_task_after = BranchCriteria::for_branch(&task_after, &[main_after]);
    let via_task = snowcore::pipeline::find(&store, &on_task_after, concept_id).unwrap().unwrap();
    assert_eq!(via_task.concept.version.path, BranchPath::main());
}
