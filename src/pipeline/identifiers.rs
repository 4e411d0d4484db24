//! Identifier reservation (spec §4.4 step 2). The real identifier service
//! lives outside this crate (spec §1); this module specifies the boundary
//! trait plus a reference implementation adequate for tests and small
//! deployments, the same "black box behind a trait" treatment the design
//! notes give the axiom converter.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::ids::{build_sctid, ComponentId, ComponentKind};

pub trait IdentifierService: Send + Sync {
    /// Batch-allocates `count` fresh ids of `kind` (spec §4.4 step 2:
    /// "Batch-allocate IDs ... from the identifier service").
    fn reserve(&self, kind: ComponentKind, count: usize) -> Result<Vec<ComponentId>>;
}

/// An in-process monotonic counter per component kind. Production
/// deployments replace this with a call to the external identifier
/// registration service.
#[derive(Default)]
pub struct SequentialIdentifierService {
    concept: AtomicU64,
    description: AtomicU64,
    relationship: AtomicU64,
}

impl SequentialIdentifierService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentifierService for SequentialIdentifierService {
    fn reserve(&self, kind: ComponentKind, count: usize) -> Result<Vec<ComponentId>> {
        let counter = match kind {
            ComponentKind::Concept => &self.concept,
            ComponentKind::Description => &self.description,
            ComponentKind::Relationship => &self.relationship,
        };
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let seq = counter.fetch_add(1, Ordering::SeqCst) + 1;
            out.push(build_sctid(kind, seq));
        }
        Ok(out)
    }
}
