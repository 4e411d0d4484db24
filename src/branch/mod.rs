//! Branch registry and the version-control helper that derives branch
//! criteria predicates from it (spec §4.1, §4.2).

mod criteria;
mod registry;

pub use criteria::BranchCriteria;
pub use registry::{BranchRegistry, InMemoryBranchRegistry, LogicalClock};
