use thiserror::Error;

use crate::ids::ComponentId;
use crate::model::BranchPath;

/// The crate-wide error type. One variant per error kind in the design's
/// error-handling policy: write-path errors roll the enclosing commit back,
/// read-path errors propagate to the caller as-is.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("branch not found: {0}")]
    BranchNotFound(BranchPath),

    #[error("component not found: {0}")]
    ComponentNotFound(ComponentId),

    #[error("branch already exists: {0}")]
    AlreadyExists(BranchPath),

    #[error("parent branch missing for: {0}")]
    ParentMissing(BranchPath),

    #[error("branch is locked: {0}")]
    Locked(BranchPath),

    #[error("conflict on component {component} between {ours} and {theirs}")]
    Conflict {
        component: ComponentId,
        ours: i64,
        theirs: i64,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("cycle detected among concepts: {0:?}")]
    CycleDetected(Vec<ComponentId>),

    #[error("integrity violation (dropped): {0}")]
    Integrity(String),

    #[error("internal store error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidArgument(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        StoreError::Unsupported(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        StoreError::Internal(msg.into())
    }

    /// True for errors in the set that must roll the enclosing commit back
    /// rather than merely propagate (see design notes §7).
    pub fn is_write_fatal(&self) -> bool {
        !matches!(self, StoreError::Integrity(_))
    }
}
