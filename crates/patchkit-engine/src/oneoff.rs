use std::path::Path;

use patchkit_manifest::PatchRecord;
use patchkit_store::BlobStore;

use crate::apply::{apply_package_patch, ApplyOptions, ApplyOutcome};
use crate::error::EngineError;
use crate::rollback::rollback_package_patch;

/// A one-off apply (§4.5.5): stores both before and after blobs in a
/// scratch directory, applies, and hands back a rollback closure. No
/// manifest mutation, no persistent state; the scratch directory is
/// guaranteed to be removed once the returned guard drops.
pub struct OneOffApply {
    package_path: std::path::PathBuf,
    record: PatchRecord,
    blobs: BlobStore,
    _scratch: tempfile::TempDir,
}

impl OneOffApply {
    pub async fn roll_back(self) -> Result<(), EngineError> {
        rollback_package_patch(&self.package_path, &self.record, &self.blobs).await?;
        Ok(())
    }
}

/// Run one-off apply: `before_content`/`after_content` are keyed the same
/// way as `record.files` (by manifest file path) so the scratch store can
/// be seeded without touching the persistent blob store.
pub async fn apply_one_off(
    package_path: &Path,
    record: PatchRecord,
    before_content: &indexmap::IndexMap<String, Vec<u8>>,
    after_content: &indexmap::IndexMap<String, Vec<u8>>,
) -> Result<(ApplyOutcome, OneOffApply), EngineError> {
    let scratch = tempfile::TempDir::new()?;
    let blobs = BlobStore::new(scratch.path().to_path_buf());

    for (file_path, entry) in &record.files {
        if let Some(content) = before_content.get(file_path) {
            blobs.put(&entry.before_hash, content)?;
        }
        if let Some(content) = after_content.get(file_path) {
            blobs.put(&entry.after_hash, content)?;
        }
    }

    // `scratch` drops (and removes the directory) on both the success and
    // failure paths below, since `?` propagates before `guard` is built.
    let outcome =
        apply_package_patch(package_path, &record, &blobs, ApplyOptions::default()).await?;

    let guard = OneOffApply {
        package_path: package_path.to_path_buf(),
        record,
        blobs,
        _scratch: scratch,
    };

    Ok((outcome, guard))
}
