//! Component identities: numeric SCTIDs for Concept/Description/Relationship,
//! UUIDs for ReferenceSetMember, and branch paths.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// The numeric SNOMED CT identifier. 6-18 digits, a partition identifier and
/// (optionally) a namespace embedded in the digits preceding the final
/// Verhoeff check digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of component a [`ComponentId`]'s partition digits claim to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Concept,
    Description,
    Relationship,
}

impl ComponentId {
    /// Partition identifier: the two digits immediately preceding the check
    /// digit. First digit of the pair selects the component kind, second
    /// selects short-form (`0`) vs namespace-form (`1`).
    pub fn partition_id(&self) -> Result<u8> {
        let digits = self.0.to_string();
        if digits.len() < 6 || digits.len() > 18 {
            return Err(StoreError::invalid(format!(
                "SCTID {self} has {} digits, expected 6-18",
                digits.len()
            )));
        }
        let partition = &digits[digits.len() - 3..digits.len() - 1];
        partition
            .parse::<u8>()
            .map_err(|_| StoreError::invalid(format!("SCTID {self} has a malformed partition id")))
    }

    pub fn kind(&self) -> Result<ComponentKind> {
        match self.partition_id()? / 10 {
            0 => Ok(ComponentKind::Concept),
            1 => Ok(ComponentKind::Description),
            2 => Ok(ComponentKind::Relationship),
            other => Err(StoreError::invalid(format!(
                "SCTID {self} has unrecognized partition component kind {other}"
            ))),
        }
    }

    pub fn is_namespace_form(&self) -> Result<bool> {
        Ok(self.partition_id()? % 10 == 1)
    }

    /// Validates the trailing Verhoeff check digit against the preceding
    /// digits.
    pub fn check_digit_valid(&self) -> bool {
        verhoeff::validate(self.0)
    }

    pub fn of_kind(&self, expected: ComponentKind) -> Result<()> {
        let actual = self.kind()?;
        if actual != expected {
            return Err(StoreError::invalid(format!(
                "SCTID {self} has kind {actual:?}, expected {expected:?}"
            )));
        }
        Ok(())
    }
}

/// Builds a valid SCTID for a given kind and sequence number, short form,
/// namespace-free. Used by identifier reservation in the update pipeline.
pub fn build_sctid(kind: ComponentKind, sequence: u64) -> ComponentId {
    let partition: u64 = match kind {
        ComponentKind::Concept => 0,
        ComponentKind::Description => 1,
        ComponentKind::Relationship => 2,
    };
    // Offset so the item identifier portion is never shorter than SNOMED
    // CT's minimum 6-digit SCTID, even for small sequence numbers.
    let item_identifier = sequence + 100_000;
    let body = item_identifier * 100 + partition * 10;
    let with_check = verhoeff::append_check_digit(body);
    ComponentId(with_check)
}

mod verhoeff {
    // The D5 dihedral group's multiplication table: `D[c][d]` combines the
    // running checksum `c` with a (permuted) digit `d`. Indexed by `c` over
    // its full 0-9 range, so this needs all ten rows, not just the eight
    // `P` happens to have (one per position mod 8).
    const D: [[u8; 10]; 10] = [
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
        [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
        [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
        [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
        [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
        [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
        [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
        [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
        [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
        [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
    ];
    const P: [[u8; 10]; 8] = [
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
        [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
        [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
        [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
        [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
        [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
        [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
        [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
    ];
    const INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

    fn digits_rev(value: u64) -> Vec<u8> {
        value
            .to_string()
            .bytes()
            .rev()
            .map(|b| b - b'0')
            .collect()
    }

    /// Threads `digits_rev` (least-significant digit first) through the
    /// dihedral/permutation tables, starting from `c = 0` at `pos_offset`
    /// digits into the permutation cycle. `pos_offset = 0` reproduces the
    /// standard `validate` walk (the check digit itself occupies position
    /// 0); `pos_offset = 1` reproduces `generate`'s walk over the body
    /// digits alone, reserving position 0 for the check digit once it's
    /// appended.
    fn checksum(digits_rev: &[u8], pos_offset: usize) -> u8 {
        let mut c = 0u8;
        for (i, &d) in digits_rev.iter().enumerate() {
            let permuted = P[(i + pos_offset) % 8][d as usize];
            c = D[c as usize][permuted as usize];
        }
        c
    }

    /// Appends a Verhoeff check digit to `body`, returning the full number.
    pub fn append_check_digit(body: u64) -> u64 {
        let c = checksum(&digits_rev(body), 1);
        body * 10 + INV[c as usize] as u64
    }

    /// Validates that the last digit of `value` is the correct Verhoeff
    /// check digit for the preceding digits.
    pub fn validate(value: u64) -> bool {
        checksum(&digits_rev(value), 0) == 0
    }
}

/// A reference-set member id. Always a UUID, independent of the numeric
/// SCTID space used by Concept/Description/Relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub Uuid);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MemberId {
    pub fn new() -> Self {
        MemberId(Uuid::new_v4())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_check_digit() {
        let id = build_sctid(ComponentKind::Concept, 509600);
        assert!(id.check_digit_valid());
        assert_eq!(id.kind().unwrap(), ComponentKind::Concept);
    }

    #[test]
    fn rejects_short_sctid() {
        let id = ComponentId(123);
        assert!(id.partition_id().is_err());
    }

    #[test]
    fn kind_dispatch_matches_partition() {
        let concept = build_sctid(ComponentKind::Concept, 1);
        let description = build_sctid(ComponentKind::Description, 1);
        let relationship = build_sctid(ComponentKind::Relationship, 1);
        assert_eq!(concept.kind().unwrap(), ComponentKind::Concept);
        assert_eq!(description.kind().unwrap(), ComponentKind::Description);
        assert_eq!(relationship.kind().unwrap(), ComponentKind::Relationship);
        assert!(concept.of_kind(ComponentKind::Description).is_err());
    }
}
