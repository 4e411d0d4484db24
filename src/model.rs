//! Core entities: Branch, the common ComponentVersion envelope, Concept,
//! Description, Relationship, ReferenceSetMember and QueryConcept.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{ComponentId, MemberId};

/// A slash-delimited branch path, e.g. `MAIN`, `MAIN/PROJ`, `MAIN/PROJ/TASK`.
/// The parent is always derivable lexically from the path itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchPath(String);

impl BranchPath {
    pub const MAIN: &'static str = "MAIN";

    pub fn new(path: impl Into<String>) -> Self {
        BranchPath(path.into())
    }

    pub fn main() -> Self {
        BranchPath(Self::MAIN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_main(&self) -> bool {
        self.0 == Self::MAIN
    }

    /// The parent path, or `None` if this is `MAIN`.
    pub fn parent(&self) -> Option<BranchPath> {
        self.0.rsplit_once('/').map(|(parent, _)| BranchPath(parent.to_string()))
    }

    /// All ancestor paths from the immediate parent up to (and including)
    /// `MAIN`, nearest first.
    pub fn ancestors(&self) -> Vec<BranchPath> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(p) = cur {
            let next = p.parent();
            out.push(p);
            cur = next;
        }
        out
    }

    pub fn child(&self, segment: &str) -> BranchPath {
        BranchPath(format!("{}/{}", self.0, segment))
    }
}

impl fmt::Display for BranchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotonically increasing timepoint (milliseconds), assigned at commit.
pub type Timepoint = i64;

/// Branch registry entry. `head` and `base` are timepoints; `parent` is
/// derived lexically from `path` rather than stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub path: BranchPath,
    pub base: Timepoint,
    pub head: Timepoint,
    pub locked: bool,
    pub metadata: BTreeMap<String, String>,
}

impl Branch {
    pub fn parent(&self) -> Option<BranchPath> {
        self.path.parent()
    }
}

/// The envelope shared by every stored component version, matching the
/// fields carried on each row per the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentVersion {
    pub path: BranchPath,
    pub start: Timepoint,
    pub end: Option<Timepoint>,
    pub active: bool,
    pub module_id: ComponentId,
    pub effective_time: Option<i64>,
    pub release_hash: Option<[u8; 16]>,
    /// The `effectiveTime` of the release that `release_hash` was computed
    /// against, kept even while `effective_time` is transiently cleared by
    /// an unreleased edit — restored if a later edit reverts the released
    /// field subset back to a matching hash (invariant §3.6).
    pub released_effective_time: Option<i64>,
    pub deleted: bool,
}

impl ComponentVersion {
    pub fn is_current(&self) -> bool {
        self.end.is_none() && !self.deleted
    }

    pub fn visible_at(&self, t: Timepoint) -> bool {
        self.start <= t && self.end.map(|e| t < e).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: ComponentId,
    pub definition_status_id: DefinitionStatus,
    pub version: ComponentVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefinitionStatus {
    Primitive,
    FullyDefined,
}

impl DefinitionStatus {
    /// SNOMED CT's well-known SCTIDs for the two definition statuses.
    pub const FULLY_DEFINED_ID: u64 = 900000000000073002;
    pub const PRIMITIVE_ID: u64 = 900000000000074008;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Description {
    pub description_id: ComponentId,
    pub concept_id: ComponentId,
    pub term: String,
    pub language_code: String,
    pub type_id: ComponentId,
    pub case_significance_id: ComponentId,
    pub version: ComponentVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacteristicType {
    Stated,
    Inferred,
    Additional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_id: ComponentId,
    pub source_id: ComponentId,
    pub destination_id: ComponentId,
    pub type_id: ComponentId,
    pub group: u32,
    pub characteristic_type: CharacteristicType,
    pub modifier_id: ComponentId,
    pub version: ComponentVersion,
}

/// The "is a" relationship type id, `116680003`.
pub const ISA_TYPE_ID: u64 = 116680003;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSetMember {
    pub member_id: MemberId,
    pub refset_id: ComponentId,
    pub referenced_component_id: ComponentId,
    pub additional_fields: BTreeMap<String, String>,
    pub version: ComponentVersion,
}

impl ReferenceSetMember {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.additional_fields.get(key).map(|s| s.as_str())
    }
}

/// Polymorphic dispatch tag over the four persisted component kinds, per
/// the design notes' "Polymorphic dispatch on SnomedComponent type".
#[derive(Debug, Clone)]
pub enum SnomedComponent {
    Concept(Concept),
    Description(Description),
    Relationship(Relationship),
    ReferenceSetMember(ReferenceSetMember),
}

/// Common behaviour every stored component supports, collapsing "which
/// repository" dispatch to a single match on the variant.
pub trait Component {
    fn id_display(&self) -> String;
    fn version(&self) -> &ComponentVersion;
    fn version_mut(&mut self) -> &mut ComponentVersion;
    fn mark_changed(&mut self) {}
    fn mark_deleted(&mut self) {
        self.version_mut().deleted = true;
    }
    fn is_released(&self) -> bool {
        self.version().effective_time.is_some()
    }
}

impl Component for Concept {
    fn id_display(&self) -> String {
        self.concept_id.to_string()
    }
    fn version(&self) -> &ComponentVersion {
        &self.version
    }
    fn version_mut(&mut self) -> &mut ComponentVersion {
        &mut self.version
    }
}

impl Component for Description {
    fn id_display(&self) -> String {
        self.description_id.to_string()
    }
    fn version(&self) -> &ComponentVersion {
        &self.version
    }
    fn version_mut(&mut self) -> &mut ComponentVersion {
        &mut self.version
    }
}

impl Component for Relationship {
    fn id_display(&self) -> String {
        self.relationship_id.to_string()
    }
    fn version(&self) -> &ComponentVersion {
        &self.version
    }
    fn version_mut(&mut self) -> &mut ComponentVersion {
        &mut self.version
    }
}

impl Component for ReferenceSetMember {
    fn id_display(&self) -> String {
        self.member_id.to_string()
    }
    fn version(&self) -> &ComponentVersion {
        &self.version
    }
    fn version_mut(&mut self) -> &mut ComponentVersion {
        &mut self.version
    }
}

/// A semantic-index row: a concept's ancestor and parent sets on one branch,
/// for one form (stated or inferred).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConcept {
    pub concept_id: ComponentId,
    pub parents: HashSet<ComponentId>,
    pub ancestors: HashSet<ComponentId>,
    pub path: BranchPath,
    pub stated: bool,
}

impl QueryConcept {
    pub fn new(concept_id: ComponentId, path: BranchPath, stated: bool) -> Self {
        QueryConcept {
            concept_id,
            parents: HashSet::new(),
            ancestors: HashSet::new(),
            path,
            stated,
        }
    }
}
