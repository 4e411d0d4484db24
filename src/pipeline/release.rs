//! Release-field fingerprinting and `effectiveTime` bookkeeping (invariant
//! §3.6, spec §4.4 step 5 "copy release details forward; recompute
//! `effectiveTime`"). A component's released field subset is hashed with
//! Blake2s; comparing the freshly computed hash against the last-released
//! one tells the pipeline whether an edit needs to clear `effectiveTime` or
//! can restore it.

use blake2::{Blake2s256, Digest};

use crate::model::ComponentVersion;

pub fn fingerprint(parts: &[&str]) -> [u8; 16] {
    let mut hasher = Blake2s256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Returns `(effective_time, release_hash, released_effective_time)` to
/// stamp on the new version envelope.
///
/// - `incoming_effective_time` is `Some` exactly when this save is itself
///   publishing a release (e.g. an RF2 import), in which case the new
///   fingerprint becomes the released snapshot.
/// - Otherwise the new fingerprint is compared against the component's last
///   released snapshot (if any): a match restores `effectiveTime`, a
///   mismatch clears it while remembering the released snapshot for a
///   possible later revert.
pub fn recompute_effective_time(
    existing: Option<&ComponentVersion>,
    new_hash: [u8; 16],
    incoming_effective_time: Option<i64>,
) -> (Option<i64>, Option<[u8; 16]>, Option<i64>) {
    if let Some(et) = incoming_effective_time {
        return (Some(et), Some(new_hash), Some(et));
    }
    match existing.and_then(|v| v.release_hash.map(|h| (h, v.released_effective_time))) {
        Some((released_hash, released_et)) if released_hash == new_hash => (released_et, Some(released_hash), released_et),
        Some((released_hash, released_et)) => (None, Some(released_hash), released_et),
        None => (None, None, None),
    }
}
