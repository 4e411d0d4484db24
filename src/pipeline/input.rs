//! Input aggregates the update pipeline consumes: one per incoming concept,
//! carrying its descriptions, relationships, and axioms as the spec's
//! "collection of Concept aggregates" (spec §4.4 intro).

use std::collections::BTreeMap;

use crate::ids::ComponentId;
use crate::model::CharacteristicType;
use crate::pipeline::axioms::ClassAxiom;

#[derive(Debug, Clone)]
pub struct DescriptionInput {
    /// `None` for a new description, assigned an id during reservation.
    pub description_id: Option<ComponentId>,
    pub term: String,
    pub language_code: String,
    pub type_id: ComponentId,
    pub case_significance_id: ComponentId,
    pub active: bool,
    pub module_id: ComponentId,
    /// `languageRefsetId -> "PREFERRED" | "ACCEPTABLE"`.
    pub acceptability: BTreeMap<ComponentId, String>,
}

impl DescriptionInput {
    pub fn new(term: impl Into<String>, language_code: impl Into<String>, type_id: ComponentId, module_id: ComponentId) -> Self {
        DescriptionInput {
            description_id: None,
            term: term.into(),
            language_code: language_code.into(),
            type_id,
            case_significance_id: ComponentId(900000000000448009), // "Entire term case sensitive"
            active: true,
            module_id,
            acceptability: BTreeMap::new(),
        }
    }
}

/// An explicitly-authored relationship, as opposed to one the axiom
/// converter derives from a class/GCI axiom (spec §4.4 step 9 handles both
/// uniformly once this draft shape is built).
#[derive(Debug, Clone)]
pub struct RelationshipInput {
    pub relationship_id: Option<ComponentId>,
    pub destination_id: ComponentId,
    pub type_id: ComponentId,
    pub group: u32,
    pub characteristic_type: CharacteristicType,
    pub modifier_id: ComponentId,
    pub active: bool,
    pub module_id: ComponentId,
}

/// `None` marks deletion of the whole component, handled by the caller
/// emitting an empty/absent entry and relying on cascade retirement
/// (spec §8 S6); an empty `ConceptInput` batch is a no-op (spec §8).
#[derive(Debug, Clone)]
pub struct ConceptInput {
    pub concept_id: Option<ComponentId>,
    pub active: bool,
    pub module_id: ComponentId,
    /// Set only when this save is itself publishing a release (e.g. RF2
    /// import); `None` for ordinary authoring edits (invariant §3.6).
    pub effective_time: Option<i64>,
    pub descriptions: Vec<DescriptionInput>,
    pub relationships: Vec<RelationshipInput>,
    pub class_axioms: Vec<ClassAxiom>,
    pub gci_axioms: Vec<ClassAxiom>,
    pub inactivation_indicator_name: Option<String>,
    /// `associationName -> target concept ids`.
    pub association_targets: BTreeMap<String, Vec<ComponentId>>,
}

impl ConceptInput {
    pub fn new(module_id: ComponentId) -> Self {
        ConceptInput {
            concept_id: None,
            active: true,
            module_id,
            effective_time: None,
            descriptions: Vec::new(),
            relationships: Vec::new(),
            class_axioms: Vec::new(),
            gci_axioms: Vec::new(),
            inactivation_indicator_name: None,
            association_targets: BTreeMap::new(),
        }
    }
}
