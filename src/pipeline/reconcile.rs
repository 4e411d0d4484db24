//! Reference-set side-table reconciliation: language acceptability
//! (spec §4.4 step 6), inactivation indicator (step 7), association target
//! (step 8), and relationship finalization (step 9). Each function is pure
//! — it compares a new desired state against the existing member/
//! relationship set and returns the actions needed, so the orchestrator in
//! `pipeline::mod` is the only place that actually writes.

use std::collections::{BTreeMap, HashSet};

use crate::error::{Result, StoreError};
use crate::ids::ComponentId;
use crate::model::{CharacteristicType, ReferenceSetMember, Relationship};
use crate::pipeline::dictionaries;
use crate::pipeline::input::RelationshipInput;

/// What to do with one reference-set member slot.
#[derive(Debug, Clone)]
pub enum MemberAction {
    /// Matches an existing active member byte-for-byte; nothing to write
    /// unless the commit is a rebase replay (spec §4.4 step 6 "no-op
    /// (unless rebasing)").
    Keep(ReferenceSetMember),
    Deactivate(ReferenceSetMember),
    UpdateField {
        existing: ReferenceSetMember,
        field: &'static str,
        value: String,
    },
    Create {
        refset_id: ComponentId,
        referenced_component_id: ComponentId,
        field: &'static str,
        value: String,
    },
}

/// Reconciles a description's acceptability map against its existing
/// language-refset members (spec §4.4 step 6).
pub fn reconcile_acceptability(
    description_id: ComponentId,
    new_acceptability: &BTreeMap<ComponentId, String>,
    existing_members: &[ReferenceSetMember],
) -> Result<Vec<MemberAction>> {
    let mut actions = Vec::new();
    let mut seen_refsets: HashSet<ComponentId> = HashSet::new();

    for (&refset_id, name) in new_acceptability {
        seen_refsets.insert(refset_id);
        let wanted = dictionaries::acceptability_id(name)
            .ok_or_else(|| StoreError::invalid(format!("unrecognized acceptability value: {name}")))?;
        match existing_members
            .iter()
            .find(|m| m.refset_id == refset_id && m.version.active)
        {
            Some(existing) => {
                if existing.field("acceptabilityId") == Some(wanted.to_string().as_str()) {
                    actions.push(MemberAction::Keep(existing.clone()));
                } else {
                    actions.push(MemberAction::UpdateField {
                        existing: existing.clone(),
                        field: "acceptabilityId",
                        value: wanted.to_string(),
                    });
                }
            }
            None => actions.push(MemberAction::Create {
                refset_id,
                referenced_component_id: description_id,
                field: "acceptabilityId",
                value: wanted.to_string(),
            }),
        }
    }

    for existing in existing_members {
        if existing.version.active && !seen_refsets.contains(&existing.refset_id) {
            actions.push(MemberAction::Deactivate(existing.clone()));
        }
    }
    Ok(actions)
}

/// Reconciles a concept's inactivation indicator (spec §4.4 step 7). A
/// concept has at most one active indicator member on a given refset, so
/// this collapses to: deactivate the stale one (if any), create the new one
/// (if any), or keep the existing one unchanged.
pub fn reconcile_inactivation_indicator(
    concept_id: ComponentId,
    refset_id: ComponentId,
    new_indicator_name: Option<&str>,
    existing_members: &[ReferenceSetMember],
) -> Result<Vec<MemberAction>> {
    let existing = existing_members
        .iter()
        .find(|m| m.refset_id == refset_id && m.version.active);

    let new_value = match new_indicator_name {
        Some(name) => Some(
            dictionaries::inactivation_value_id(name)
                .ok_or_else(|| StoreError::invalid(format!("unrecognized inactivation indicator: {name}")))?,
        ),
        None => None,
    };

    match (existing, new_value) {
        (None, None) => Ok(vec![]),
        (None, Some(value)) => Ok(vec![MemberAction::Create {
            refset_id,
            referenced_component_id: concept_id,
            field: "valueId",
            value: value.to_string(),
        }]),
        (Some(existing), None) => Ok(vec![MemberAction::Deactivate(existing.clone())]),
        (Some(existing), Some(value)) => {
            if existing.field("valueId") == Some(value.to_string().as_str()) {
                Ok(vec![MemberAction::Keep(existing.clone())])
            } else {
                Ok(vec![
                    MemberAction::Deactivate(existing.clone()),
                    MemberAction::Create {
                        refset_id,
                        referenced_component_id: concept_id,
                        field: "valueId",
                        value: value.to_string(),
                    },
                ])
            }
        }
    }
}

/// Reconciles `associationName -> targets` against existing association
/// members (spec §4.4 step 8). Each association name maps to its own
/// historical-association refset, so targets are compared set-wise within
/// that refset.
pub fn reconcile_association_targets(
    concept_id: ComponentId,
    new_associations: &BTreeMap<String, Vec<ComponentId>>,
    existing_members: &[ReferenceSetMember],
) -> Result<Vec<MemberAction>> {
    let mut actions = Vec::new();
    let mut seen: HashSet<(ComponentId, ComponentId)> = HashSet::new(); // (refset_id, target)

    for (name, targets) in new_associations {
        let refset_id = dictionaries::association_refset_id(name)
            .ok_or_else(|| StoreError::invalid(format!("unrecognized association name: {name}")))?;
        for &target in targets {
            seen.insert((refset_id, target));
            let existing = existing_members.iter().find(|m| {
                m.refset_id == refset_id && m.version.active && m.field("targetComponentId") == Some(target.to_string().as_str())
            });
            match existing {
                Some(existing) => actions.push(MemberAction::Keep(existing.clone())),
                None => actions.push(MemberAction::Create {
                    refset_id,
                    referenced_component_id: concept_id,
                    field: "targetComponentId",
                    value: target.to_string(),
                }),
            }
        }
    }

    for existing in existing_members {
        if !existing.version.active {
            continue;
        }
        let Some(name) = dictionaries::association_name(existing.refset_id) else {
            continue;
        };
        let _ = name;
        let target = existing
            .field("targetComponentId")
            .and_then(|v| v.parse::<u64>().ok())
            .map(ComponentId);
        let key = target.map(|t| (existing.refset_id, t));
        if key.map(|k| !seen.contains(&k)).unwrap_or(true) {
            actions.push(MemberAction::Deactivate(existing.clone()));
        }
    }
    Ok(actions)
}

/// The key relationship finalization (spec §4.4 step 9) matches on: two
/// relationships are "the same edge" if they share type, destination,
/// group, and characteristic type. Identity (`relationshipId`) is carried
/// across a match rather than reissued.
fn relationship_key(r: &Relationship) -> (ComponentId, ComponentId, u32, CharacteristicType) {
    (r.type_id, r.destination_id, r.group, r.characteristic_type)
}

#[derive(Debug, Clone)]
pub struct RelationshipDraft {
    pub relationship_id: Option<ComponentId>,
    pub destination_id: ComponentId,
    pub type_id: ComponentId,
    pub group: u32,
    pub characteristic_type: CharacteristicType,
    pub modifier_id: ComponentId,
    pub module_id: ComponentId,
}

impl From<&RelationshipInput> for RelationshipDraft {
    fn from(input: &RelationshipInput) -> Self {
        RelationshipDraft {
            relationship_id: input.relationship_id,
            destination_id: input.destination_id,
            type_id: input.type_id,
            group: input.group,
            characteristic_type: input.characteristic_type,
            modifier_id: input.modifier_id,
            module_id: input.module_id,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RelationshipAction {
    Keep(Relationship),
    Deactivate(Relationship),
    Create(RelationshipDraft),
}

/// Reconciles the edges sourced from one active concept against the
/// existing active relationship set (spec §4.4 step 9). Matched edges keep
/// their id; new edges are flagged for id assignment; dropped edges are
/// retired rather than deleted, mirroring how components are superseded
/// elsewhere in the store.
pub fn reconcile_relationships(existing: &[Relationship], drafts: &[RelationshipDraft]) -> Vec<RelationshipAction> {
    let mut actions = Vec::new();
    let mut matched: HashSet<ComponentId> = HashSet::new();

    for draft in drafts {
        let found = existing
            .iter()
            .find(|r| r.version.active && relationship_key(r) == (draft.type_id, draft.destination_id, draft.group, draft.characteristic_type));
        match found {
            Some(existing_rel) => {
                matched.insert(existing_rel.relationship_id);
                actions.push(RelationshipAction::Keep(existing_rel.clone()));
            }
            None => actions.push(RelationshipAction::Create(draft.clone())),
        }
    }

    for existing_rel in existing {
        if existing_rel.version.active && !matched.contains(&existing_rel.relationship_id) {
            actions.push(RelationshipAction::Deactivate(existing_rel.clone()));
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BranchPath, ComponentVersion};
    use uuid::Uuid;

    fn member(refset: u64, referenced: u64, field: &str, value: &str, active: bool) -> ReferenceSetMember {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), value.to_string());
        ReferenceSetMember {
            member_id: crate::ids::MemberId(Uuid::from_u128(1)),
            refset_id: ComponentId(refset),
            referenced_component_id: ComponentId(referenced),
            additional_fields: fields,
            version: ComponentVersion {
                path: BranchPath::main(),
                start: 1,
                end: None,
                active,
                module_id: ComponentId(900000000000207008),
                effective_time: None,
                release_hash: None,
                released_effective_time: None,
                deleted: false,
            },
        }
    }

    #[test]
    fn acceptability_idempotent_when_unchanged() {
        let existing = vec![member(900000000000508004, 55, "acceptabilityId", "900000000000548007", true)];
        let mut wanted = BTreeMap::new();
        wanted.insert(ComponentId(900000000000508004), "PREFERRED".to_string());
        let actions = reconcile_acceptability(ComponentId(55), &wanted, &existing).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], MemberAction::Keep(_)));
    }

    #[test]
    fn acceptability_change_updates_field() {
        let existing = vec![member(900000000000508004, 55, "acceptabilityId", "900000000000549004", true)];
        let mut wanted = BTreeMap::new();
        wanted.insert(ComponentId(900000000000508004), "PREFERRED".to_string());
        let actions = reconcile_acceptability(ComponentId(55), &wanted, &existing).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], MemberAction::UpdateField { .. }));
    }

    #[test]
    fn acceptability_unrecognized_value_fails() {
        let mut wanted = BTreeMap::new();
        wanted.insert(ComponentId(900000000000508004), "MAYBE".to_string());
        let err = reconcile_acceptability(ComponentId(55), &wanted, &[]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn leftover_acceptability_member_deactivated() {
        let existing = vec![member(900000000000508004, 55, "acceptabilityId", "900000000000548007", true)];
        let actions = reconcile_acceptability(ComponentId(55), &BTreeMap::new(), &existing).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], MemberAction::Deactivate(_)));
    }

    #[test]
    fn indicator_unknown_name_fails() {
        let err = reconcile_inactivation_indicator(ComponentId(1), ComponentId(900000000000489007), Some("WRONG"), &[]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn indicator_change_deactivates_and_creates() {
        let existing = vec![member(900000000000489007, 1, "valueId", "900000000000482003", true)];
        let actions = reconcile_inactivation_indicator(ComponentId(1), ComponentId(900000000000489007), Some("OUTDATED"), &existing).unwrap();
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn association_unknown_name_fails() {
        let mut map = BTreeMap::new();
        map.insert("BOGUS".to_string(), vec![ComponentId(2)]);
        let err = reconcile_association_targets(ComponentId(1), &map, &[]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn relationship_reconciliation_keeps_matches_and_drops_rest() {
        let existing_rel = Relationship {
            relationship_id: ComponentId(200),
            source_id: ComponentId(1),
            destination_id: ComponentId(10),
            type_id: ComponentId(116680003),
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
        };
        let draft = RelationshipDraft {
            relationship_id: None,
            destination_id: ComponentId(10),
            type_id: ComponentId(116680003),
            group: 0,
            characteristic_type: CharacteristicType::Stated,
            modifier_id: ComponentId(900000000000451002),
            module_id: ComponentId(900000000000207008),
        };
        let actions = reconcile_relationships(std::slice::from_ref(&existing_rel), &[draft]);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], RelationshipAction::Keep(_)));
    }
}
