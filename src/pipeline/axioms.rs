//! Axiom converter: projects class/GCI axioms into OWL-axiom refset member
//! drafts (for storage) and stated relationship drafts (for the semantic
//! index), per spec §4.4 step 4. The real OWL parser/classifier is
//! out-of-scope (spec §1); this is the black-box boundary plus a
//! deterministic reference implementation sufficient for the worked
//! example in spec §8 S1/S2 (ISA + one role group).

use std::collections::BTreeMap;

use crate::error::Result;
use crate::ids::ComponentId;

/// SNOMED CT's "Role group" attribute, used to wrap a set of attributes
/// that must all hold of the same existential filler.
pub const ROLE_GROUP_ID: u64 = 609096000;

#[derive(Debug, Clone)]
pub struct ClassAxiom {
    pub parents: Vec<ComponentId>,
    /// (group, typeId, valueId). Group `0` means ungrouped.
    pub roles: Vec<(u32, ComponentId, ComponentId)>,
    pub is_gci: bool,
}

impl ClassAxiom {
    /// Per invariant §3.5: a concept is `fullyDefined` iff at least one of
    /// its axioms parses as `EquivalentClasses(...)`, i.e. it has a
    /// necessary-and-sufficient (non-GCI) definition with at least one
    /// parent or role.
    pub fn is_equivalent(&self) -> bool {
        !self.is_gci && (!self.parents.is_empty() || !self.roles.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct OwlMemberDraft {
    pub owl_expression: String,
}

#[derive(Debug, Clone)]
pub struct RelationshipDraft {
    pub destination_id: ComponentId,
    pub type_id: ComponentId,
    pub group: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AxiomConversion {
    pub owl_members: Vec<OwlMemberDraft>,
    pub stated_relationships: Vec<RelationshipDraft>,
    pub fully_defined: bool,
}

pub trait AxiomConverter: Send + Sync {
    fn convert(&self, concept_id: ComponentId, axioms: &[ClassAxiom]) -> Result<AxiomConversion>;
}

/// Deterministic reference converter: builds the literal OWL functional
/// syntax text (for storage) and an ISA + role-attribute relationship set
/// (for the semantic index) from each `ClassAxiom`.
pub struct ReferenceAxiomConverter;

impl AxiomConverter for ReferenceAxiomConverter {
    fn convert(&self, concept_id: ComponentId, axioms: &[ClassAxiom]) -> Result<AxiomConversion> {
        let mut out = AxiomConversion::default();
        for axiom in axioms {
            out.owl_members.push(OwlMemberDraft {
                owl_expression: render_owl(concept_id, axiom),
            });
            for &parent in &axiom.parents {
                out.stated_relationships.push(RelationshipDraft {
                    destination_id: parent,
                    type_id: ComponentId(crate::model::ISA_TYPE_ID),
                    group: 0,
                });
            }
            for &(group, type_id, value_id) in &axiom.roles {
                out.stated_relationships.push(RelationshipDraft {
                    destination_id: value_id,
                    type_id,
                    group,
                });
            }
            out.fully_defined = out.fully_defined || axiom.is_equivalent();
        }
        Ok(out)
    }
}

fn render_owl(concept_id: ComponentId, axiom: &ClassAxiom) -> String {
    let mut conjuncts: Vec<String> = axiom.parents.iter().map(|p| format!(":{p}")).collect();

    let mut grouped: BTreeMap<u32, Vec<(ComponentId, ComponentId)>> = BTreeMap::new();
    for &(group, type_id, value_id) in &axiom.roles {
        grouped.entry(group).or_default().push((type_id, value_id));
    }

    for (group, members) in grouped {
        if group == 0 {
            for (type_id, value_id) in members {
                conjuncts.push(format!("ObjectSomeValuesFrom(:{type_id} :{value_id})"));
            }
        } else {
            let inner = if members.len() == 1 {
                let (type_id, value_id) = members[0];
                format!("ObjectSomeValuesFrom(:{type_id} :{value_id})")
            } else {
                let parts: Vec<String> = members
                    .iter()
                    .map(|(t, v)| format!("ObjectSomeValuesFrom(:{t} :{v})"))
                    .collect();
                format!("ObjectIntersectionOf({})", parts.join(" "))
            };
            conjuncts.push(format!("ObjectSomeValuesFrom(:{ROLE_GROUP_ID} {inner})"));
        }
    }

    let body = if conjuncts.len() == 1 {
        conjuncts.into_iter().next().unwrap()
    } else {
        format!("ObjectIntersectionOf({})", conjuncts.join(" "))
    };

    let head = if axiom.is_equivalent() { "EquivalentClasses" } else { "SubClassOf" };
    format!("{head}(:{concept_id} {body})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_s1_worked_example() {
        let axiom = ClassAxiom {
            parents: vec![ComponentId(10000100)],
            roles: vec![(1, ComponentId(10000200), ComponentId(10000300))],
            is_gci: false,
        };
        let conversion = ReferenceAxiomConverter
            .convert(ComponentId(50960005), std::slice::from_ref(&axiom))
            .unwrap();
        assert!(conversion.fully_defined);
        let owl = &conversion.owl_members[0].owl_expression;
        assert!(owl.contains("EquivalentClasses(:50960005"));
        assert!(owl.contains("ObjectIntersectionOf(:10000100"));
        assert!(owl.contains("ObjectSomeValuesFrom(:609096000 ObjectSomeValuesFrom(:10000200 :10000300))"));
        assert_eq!(conversion.stated_relationships.len(), 2);
    }

    #[test]
    fn gci_is_never_fully_defined() {
        let axiom = ClassAxiom {
            parents: vec![ComponentId(10000100)],
            roles: vec![],
            is_gci: true,
        };
        let conversion = ReferenceAxiomConverter
            .convert(ComponentId(50960005), std::slice::from_ref(&axiom))
            .unwrap();
        assert!(!conversion.fully_defined);
        assert!(conversion.owl_members[0].owl_expression.starts_with("SubClassOf"));
    }
}
