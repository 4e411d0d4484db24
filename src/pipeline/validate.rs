//! Input validation (spec §4.4 step 1): required fields present, and any
//! caller-supplied id's partition digit actually matches the component kind
//! it's being inserted as (§3 Supplemented features' Integrity check).

use crate::error::{Result, StoreError};
use crate::ids::ComponentKind;
use crate::pipeline::input::ConceptInput;

pub fn validate_concept_input(input: &ConceptInput) -> Result<()> {
    if let Some(id) = input.concept_id {
        id.of_kind(ComponentKind::Concept)?;
    }

    for description in &input.descriptions {
        if description.term.trim().is_empty() {
            return Err(StoreError::invalid("description term must not be empty"));
        }
        if description.language_code.trim().is_empty() {
            return Err(StoreError::invalid("description languageCode must not be empty"));
        }
        if let Some(id) = description.description_id {
            id.of_kind(ComponentKind::Description)?;
        }
        for (_, value) in &description.acceptability {
            if value != "PREFERRED" && value != "ACCEPTABLE" {
                return Err(StoreError::invalid(format!("unrecognized acceptability value: {value}")));
            }
        }
    }

    for relationship in &input.relationships {
        if let Some(id) = relationship.relationship_id {
            id.of_kind(ComponentKind::Relationship)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{build_sctid, ComponentId};
    use crate::pipeline::input::DescriptionInput;

    #[test]
    fn rejects_mismatched_concept_partition() {
        let description_id = build_sctid(ComponentKind::Description, 1);
        let mut input = ConceptInput::new(ComponentId(900000000000207008));
        input.concept_id = Some(description_id);
        let err = validate_concept_input(&input).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_empty_term() {
        let mut input = ConceptInput::new(ComponentId(900000000000207008));
        input.descriptions.push(DescriptionInput::new(
            "",
            "en",
            ComponentId(900000000000013009),
            ComponentId(900000000000207008),
        ));
        let err = validate_concept_input(&input).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn accepts_well_formed_input() {
        let mut input = ConceptInput::new(ComponentId(900000000000207008));
        input.descriptions.push(DescriptionInput::new(
            "Heart structure",
            "en",
            ComponentId(900000000000013009),
            ComponentId(900000000000207008),
        ));
        assert!(validate_concept_input(&input).is_ok());
    }
}
