//! Versioned component store, update pipeline, semantic index maintainer,
//! and ECL planner for a SNOMED CT terminology server's core. HTTP/FHIR
//! surfaces, RF2 import/export, OWL parsing internals, the identifier
//! service's wire protocol, auth, and deployment are all out of scope —
//! this crate is the storage and query engine they would sit in front of.

#[macro_use]
extern crate tracing;

pub mod branch;
pub mod cancel;
pub mod commit;
pub mod config;
pub mod ecl;
pub mod error;
pub mod ids;
pub mod kv;
pub mod model;
pub mod pipeline;
pub mod semantic_index;
pub mod store;

pub use error::{Result, StoreError};

/// Initializes a `tracing_subscriber` fmt layer for the embedding
/// application, the same call the teacher's own binaries make at startup
/// (`ppot2ark/src/main.rs`, `src/bin/get_pp_from_ppot.rs`). This crate has
/// no binary of its own — the HTTP/FHIR server that would sit in front of
/// it (out of scope, spec §1) is expected to call this, or do its own
/// equivalent, before driving commits. Safe to call more than once; only
/// the first call installs the global subscriber.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .try_init();
}
