use std::collections::HashSet;

use patchkit_manifest::Manifest;
use patchkit_store::BlobStore;

use crate::error::EngineError;

/// Outcome of one GC sweep (§4.5.4).
#[derive(Debug, Clone, Default)]
pub struct GcReport {
    pub deleted: Vec<String>,
    pub bytes_freed: u64,
}

/// Delete every blob not referenced by any manifest entry's `afterHash`.
/// Before-blobs are never retained (§4.5.4's rationale: rollback fetches
/// them on demand), so they are never part of the used set regardless of
/// whether they happen to still be present in the store.
pub fn collect_garbage(
    manifest: &Manifest,
    blobs: &BlobStore,
    dry_run: bool,
) -> Result<GcReport, EngineError> {
    let used: HashSet<&str> = manifest
        .patches
        .values()
        .flat_map(|record| record.files.values())
        .map(|entry| entry.after_hash.as_str())
        .collect();

    let mut report = GcReport::default();
    for hash in blobs.list()? {
        if used.contains(hash.as_str()) {
            continue;
        }

        let size = fs_err::metadata(blobs.dir().join(&hash))
            .map(|metadata| metadata.len())
            .unwrap_or(0);

        if !dry_run {
            blobs.delete(&hash)?;
        }

        report.bytes_freed += size;
        report.deleted.push(hash);
    }

    Ok(report)
}
