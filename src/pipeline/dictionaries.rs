//! Name dictionaries the update pipeline resolves free-text authoring
//! values against: language acceptability, inactivation indicator reason,
//! and historical association type. Spec §4.4 steps 6-8 call these "the
//! recognized set" / "the name dictionary" / "the reverse name map" without
//! giving their contents; the values below are SNOMED CT's actual published
//! refset and concept ids for these well-known reference sets, since an
//! implementation needs *some* concrete table and inventing placeholder ids
//! would be worse than using the real ones.

use crate::ids::ComponentId;

pub const OWL_AXIOM_REFSET: u64 = 733073007;
pub const CONCEPT_INACTIVATION_INDICATOR_REFSET: u64 = 900000000000489007;
pub const DESCRIPTION_INACTIVATION_INDICATOR_REFSET: u64 = 900000000000490003;

pub const PREFERRED_ACCEPTABILITY: u64 = 900000000000548007;
pub const ACCEPTABLE_ACCEPTABILITY: u64 = 900000000000549004;

pub fn acceptability_id(name: &str) -> Option<ComponentId> {
    match name {
        "PREFERRED" => Some(ComponentId(PREFERRED_ACCEPTABILITY)),
        "ACCEPTABLE" => Some(ComponentId(ACCEPTABLE_ACCEPTABILITY)),
        _ => None,
    }
}

pub fn acceptability_name(id: ComponentId) -> Option<&'static str> {
    match id.0 {
        PREFERRED_ACCEPTABILITY => Some("PREFERRED"),
        ACCEPTABLE_ACCEPTABILITY => Some("ACCEPTABLE"),
        _ => None,
    }
}

const INACTIVATION_REASONS: &[(&str, u64)] = &[
    ("DUPLICATE", 900000000000482003),
    ("OUTDATED", 900000000000483008),
    ("AMBIGUOUS", 900000000000484002),
    ("ERRONEOUS", 900000000000485001),
    ("LIMITED", 900000000000486000),
    ("MOVED_ELSEWHERE", 900000000000487009),
    ("PENDING_MOVE", 900000000000492005),
    ("NON_CONFORMANCE_TO_EDITORIAL_POLICY", 900000000000494007),
    ("CONCEPT_NON_CURRENT", 900000000000495008),
];

pub fn inactivation_value_id(name: &str) -> Option<ComponentId> {
    INACTIVATION_REASONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| ComponentId(*id))
}

pub fn inactivation_name(id: ComponentId) -> Option<&'static str> {
    INACTIVATION_REASONS
        .iter()
        .find(|(_, v)| *v == id.0)
        .map(|(n, _)| *n)
}

const HISTORICAL_ASSOCIATIONS: &[(&str, u64)] = &[
    ("SAME_AS", 900000000000527005),
    ("REPLACED_BY", 900000000000526001),
    ("WAS_A", 900000000000528000),
    ("POSSIBLY_EQUIVALENT_TO", 900000000000523009),
    ("MOVED_TO", 900000000000525002),
    ("MOVED_FROM", 900000000000524003),
    ("ALTERNATIVE", 900000000000530003),
    ("REFERS_TO", 900000000000531004),
    ("POSSIBLY_REPLACED_BY", 900000000001260002),
    ("PARTIALLY_EQUIVALENT_TO", 1186924009),
];

/// The reverse name map spec §4.4 step 8 resolves `associationName` through.
pub fn association_refset_id(name: &str) -> Option<ComponentId> {
    HISTORICAL_ASSOCIATIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| ComponentId(*id))
}

pub fn association_name(refset_id: ComponentId) -> Option<&'static str> {
    HISTORICAL_ASSOCIATIONS
        .iter()
        .find(|(_, v)| *v == refset_id.0)
        .map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptability_round_trips() {
        let id = acceptability_id("PREFERRED").unwrap();
        assert_eq!(acceptability_name(id), Some("PREFERRED"));
        assert!(acceptability_id("bogus").is_none());
    }

    #[test]
    fn association_round_trips() {
        let id = association_refset_id("SAME_AS").unwrap();
        assert_eq!(association_name(id), Some("SAME_AS"));
    }

    #[test]
    fn inactivation_round_trips() {
        let id = inactivation_value_id("DUPLICATE").unwrap();
        assert_eq!(inactivation_name(id), Some("DUPLICATE"));
    }
}
