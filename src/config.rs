//! The one tunable the design calls out by name: the chunk size the update
//! pipeline batches description reconciliation into, to cap backend query
//! clause counts (spec §5).

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Partition size for batched description/member writes. Spec §5 names
    /// 800-1024 as the typical range.
    pub clause_limit: usize,
    pub default_branch: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            clause_limit: 1000,
            default_branch: "MAIN".to_string(),
        }
    }
}
