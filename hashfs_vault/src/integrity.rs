//! Integrity checking support: issue reporting and the orphan sweep.
//!
//! The full check walks every file's chain (driven by the engine, which
//! owns the metadata) and then sweeps the `files` collection for blobs
//! no surviving chain or head pointer references. The sweep is
//! conservative: only keys provably unreferenced are deleted.

use crate::context::VaultContext;
use crate::engine::PROBE_KEY;
use crate::error::VaultResult;
use hashfs_core::store::{Collection, WriteBatch};
use std::collections::HashSet;

/// One problem found by the integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub name: String,
    /// Offending version, when the problem is version-specific.
    pub version: Option<u64>,
    pub detail: String,
}

/// Summary of an integrity-check run.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    /// Every problem found, including ones recovery handled.
    pub issues: Vec<IntegrityIssue>,
    /// Files removed because no retained version was recoverable.
    pub files_removed: Vec<String>,
    /// Unreferenced payload blobs deleted from `files`.
    pub orphans_removed: u64,
}

/// Deletes every `files` key that no surviving chain version nor any
/// head pointer references. Returns the number of blobs removed.
pub(crate) async fn sweep_orphans(
    ctx: &VaultContext,
    referenced: &HashSet<String>,
) -> VaultResult<u64> {
    let keys = ctx.store.list_keys(Collection::Files).await?;
    let mut batch = WriteBatch::new();
    let mut removed = 0u64;
    for key in keys {
        // The probe marker is transient bookkeeping, never content.
        if key == PROBE_KEY || referenced.contains(&key) {
            continue;
        }
        tracing::debug!("deleting orphan payload {key}");
        batch.delete(Collection::Files, key);
        removed += 1;
    }
    if !batch.is_empty() {
        ctx.store.commit(batch).await?;
    }
    Ok(removed)
}
