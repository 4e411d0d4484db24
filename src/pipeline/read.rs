//! Concept aggregate assembly for reads. One invariant here is not merely
//! maintained by the write path: §3.5 ties `definitionStatusId` to the
//! *live* set of OWL axiom refset members, so `find` recomputes it from
//! whatever members are currently visible rather than trusting the concept
//! row's stored value. Spec §8 S2 exercises exactly this by deleting an
//! axiom member directly and expecting the next read to notice.

use std::collections::BTreeMap;

use crate::branch::BranchCriteria;
use crate::error::Result;
use crate::ids::ComponentId;
use crate::model::{Concept, DefinitionStatus, Description, ReferenceSetMember, Relationship};
use crate::pipeline::dictionaries;
use crate::store::ComponentStore;

#[derive(Debug, Clone)]
pub struct ConceptAggregateView {
    pub concept: Concept,
    pub descriptions: Vec<Description>,
    pub relationships: Vec<Relationship>,
    pub owl_axiom_members: Vec<ReferenceSetMember>,
    pub inactivation_indicator: Option<String>,
    pub association_targets: BTreeMap<String, Vec<ComponentId>>,
    /// `descriptionId -> (languageRefsetId -> "PREFERRED" | "ACCEPTABLE")`.
    pub acceptability: BTreeMap<ComponentId, BTreeMap<ComponentId, String>>,
}

/// Invariant §3.5: fully defined iff at least one active OWL axiom member
/// parses as `EquivalentClasses(...)`.
pub fn recompute_definition_status(owl_axiom_members: &[ReferenceSetMember]) -> DefinitionStatus {
    let fully_defined = owl_axiom_members.iter().any(|m| {
        m.version.active
            && m.field("owlExpression")
                .map(|expr| expr.trim_start().starts_with("EquivalentClasses("))
                .unwrap_or(false)
    });
    if fully_defined {
        DefinitionStatus::FullyDefined
    } else {
        DefinitionStatus::Primitive
    }
}

pub fn find(store: &ComponentStore, criteria: &BranchCriteria, concept_id: ComponentId) -> Result<Option<ConceptAggregateView>> {
    let Some(mut concept) = store.concepts.find(criteria, &concept_id)? else {
        return Ok(None);
    };

    let descriptions: Vec<Description> = store
        .descriptions
        .visible_set(criteria)?
        .into_iter()
        .filter(|d| d.concept_id == concept_id)
        .collect();

    let relationships: Vec<Relationship> = store
        .relationships
        .visible_set(criteria)?
        .into_iter()
        .filter(|r| r.source_id == concept_id)
        .collect();

    let mut referenced_ids: Vec<ComponentId> = vec![concept_id];
    referenced_ids.extend(descriptions.iter().map(|d| d.description_id));

    let members: Vec<ReferenceSetMember> = store
        .members
        .visible_set(criteria)?
        .into_iter()
        .filter(|m| m.version.active && referenced_ids.contains(&m.referenced_component_id))
        .collect();

    let owl_axiom_members: Vec<ReferenceSetMember> = members
        .iter()
        .filter(|m| m.referenced_component_id == concept_id && m.refset_id.0 == dictionaries::OWL_AXIOM_REFSET)
        .cloned()
        .collect();
    concept.definition_status_id = recompute_definition_status(&owl_axiom_members);

    let inactivation_indicator = members
        .iter()
        .find(|m| {
            m.referenced_component_id == concept_id
                && m.refset_id.0 == dictionaries::CONCEPT_INACTIVATION_INDICATOR_REFSET
        })
        .and_then(|m| m.field("valueId"))
        .and_then(|v| v.parse::<u64>().ok())
        .and_then(|v| dictionaries::inactivation_name(ComponentId(v)))
        .map(str::to_string);

    let mut association_targets: BTreeMap<String, Vec<ComponentId>> = BTreeMap::new();
    for m in members.iter().filter(|m| m.referenced_component_id == concept_id) {
        if let Some(name) = dictionaries::association_name(m.refset_id) {
            if let Some(target) = m.field("targetComponentId").and_then(|v| v.parse::<u64>().ok()) {
                association_targets.entry(name.to_string()).or_default().push(ComponentId(target));
            }
        }
    }

    let mut acceptability: BTreeMap<ComponentId, BTreeMap<ComponentId, String>> = BTreeMap::new();
    for m in &members {
        if let Some(name) = m
            .field("acceptabilityId")
            .and_then(|v| v.parse::<u64>().ok())
            .and_then(|v| dictionaries::acceptability_name(ComponentId(v)))
        {
            acceptability
                .entry(m.referenced_component_id)
                .or_default()
                .insert(m.refset_id, name.to_string());
        }
    }

    Ok(Some(ConceptAggregateView {
        concept,
        descriptions,
        relationships,
        owl_axiom_members,
        inactivation_indicator,
        association_targets,
        acceptability,
    }))
}
