use std::path::{Path, PathBuf};

use patchkit_manifest::PatchRecord;
use patchkit_store::BlobStore;

use crate::error::EngineError;
use crate::verify::{verify_file_rollback, RollbackVerifyResult, RollbackVerifyStatus};

/// Result of rolling back one package's patch (§4.5.3).
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub verifications: Vec<RollbackVerifyResult>,
    pub files_rolled_back: Vec<PathBuf>,
}

/// Symmetric to [`crate::apply::apply_package_patch`]: verify every file
/// before mutating any; a missing before-blob fails with `BlobMissing`,
/// signalling the caller to fetch it on demand (no before-blobs are kept
/// in the local store by design, see §4.5.4).
pub async fn rollback_package_patch(
    package_path: &Path,
    record: &PatchRecord,
    blobs: &BlobStore,
) -> Result<RollbackOutcome, EngineError> {
    let mut verifications = Vec::with_capacity(record.files.len());
    for (file_path, entry) in &record.files {
        let result = verify_file_rollback(package_path, file_path, entry).await?;
        match result.status {
            RollbackVerifyStatus::NotFound => {
                return Err(EngineError::FileNotFound { path: result.path });
            }
            RollbackVerifyStatus::HashMismatch => {
                return Err(EngineError::HashMismatch {
                    path: result.path,
                    before: entry.before_hash.clone(),
                    after: entry.after_hash.clone(),
                    actual: result.actual_hash.clone().unwrap_or_default(),
                });
            }
            RollbackVerifyStatus::AlreadyOriginal | RollbackVerifyStatus::ReadyToRollback => {}
        }
        verifications.push(result);
    }

    let already_done = verifications
        .iter()
        .all(|v| v.status == RollbackVerifyStatus::AlreadyOriginal);
    if already_done {
        return Ok(RollbackOutcome {
            verifications,
            files_rolled_back: Vec::new(),
        });
    }

    let mut files_rolled_back = Vec::new();
    for ((_, entry), verification) in record.files.iter().zip(&verifications) {
        if verification.status == RollbackVerifyStatus::AlreadyOriginal {
            continue;
        }

        let target = verification.path.clone();
        let content = blobs
            .get(&entry.before_hash)?
            .ok_or_else(|| EngineError::BlobMissing {
                hashes: vec![entry.before_hash.clone()],
            })?;

        patchkit_fs::atomic_write(&target, &content)?;

        let post_write_hash = patchkit_hash::hash_file(&target).await?;
        if post_write_hash != entry.before_hash {
            return Err(EngineError::PostWriteHashMismatch {
                path: target,
                expected: entry.before_hash.clone(),
                actual: post_write_hash,
            });
        }

        files_rolled_back.push(target);
    }

    Ok(RollbackOutcome {
        verifications,
        files_rolled_back,
    })
}

/// The rollback selector (§4.5.3): a `pkg:`-prefixed identifier is a PURL
/// (exact key lookup), anything else is parsed as a UUID (linear search).
/// `None` selects every manifest patch as a candidate.
pub fn select_candidates<'a>(
    manifest: &'a patchkit_manifest::Manifest,
    identifier: Option<&str>,
) -> Result<Vec<(&'a patchkit_purl::Purl, &'a PatchRecord)>, EngineError> {
    let Some(identifier) = identifier else {
        return Ok(manifest.patches.iter().collect());
    };

    if patchkit_purl::looks_like_purl(identifier) {
        let purl: patchkit_purl::Purl = identifier
            .parse()
            .map_err(|_| EngineError::IdentifierNotFound {
                identifier: identifier.to_string(),
            })?;
        return manifest
            .patches
            .get_key_value(&purl)
            .map(|(p, r)| vec![(p, r)])
            .ok_or_else(|| EngineError::IdentifierNotFound {
                identifier: identifier.to_string(),
            });
    }

    let uuid: uuid::Uuid = identifier
        .parse()
        .map_err(|_| EngineError::IdentifierNotFound {
            identifier: identifier.to_string(),
        })?;
    manifest
        .find_by_uuid(uuid)
        .map(|pair| vec![pair])
        .ok_or_else(|| EngineError::IdentifierNotFound {
            identifier: identifier.to_string(),
        })
}
