use std::path::{Path, PathBuf};

use patchkit_manifest::FileEntry;

use crate::error::EngineError;

/// Outcome of comparing a file's current content hash against a patch's
/// before/after hashes (§4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    NotFound,
    AlreadyPatched,
    Ready,
    HashMismatch,
}

/// Outcome of the rollback-direction verification (§4.5.3): same
/// comparison, different vocabulary for the two matching cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackVerifyStatus {
    NotFound,
    AlreadyOriginal,
    ReadyToRollback,
    HashMismatch,
}

#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub path: PathBuf,
    pub status: VerifyStatus,
    /// The file's current hash, `None` when the file is absent.
    pub actual_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RollbackVerifyResult {
    pub path: PathBuf,
    pub status: RollbackVerifyStatus,
    pub actual_hash: Option<String>,
}

/// Strip the leading `package/` segment from `file_path` and join with
/// `package_path`, refusing to resolve through a symlink that escapes
/// `package_path` (patchkit_fs's defense-in-depth guard).
pub fn resolve_file_path(package_path: &Path, file_path: &str) -> Result<PathBuf, EngineError> {
    Ok(patchkit_fs::resolve_target(package_path, file_path)?)
}

/// `verifyFilePatch` (§4.5.1): hash the target file and classify it
/// against the entry's before/after hashes.
pub async fn verify_file_patch(
    package_path: &Path,
    file_path: &str,
    entry: &FileEntry,
) -> Result<VerifyResult, EngineError> {
    let target = resolve_file_path(package_path, file_path)?;

    if !target.is_file() {
        return Ok(VerifyResult {
            path: target,
            status: VerifyStatus::NotFound,
            actual_hash: None,
        });
    }

    let current = patchkit_hash::hash_file(&target).await?;

    let status = if current == entry.after_hash {
        VerifyStatus::AlreadyPatched
    } else if current == entry.before_hash {
        VerifyStatus::Ready
    } else {
        VerifyStatus::HashMismatch
    };

    Ok(VerifyResult {
        path: target,
        status,
        actual_hash: Some(current),
    })
}

/// Symmetric rollback-direction verification (§4.5.3).
pub async fn verify_file_rollback(
    package_path: &Path,
    file_path: &str,
    entry: &FileEntry,
) -> Result<RollbackVerifyResult, EngineError> {
    let target = resolve_file_path(package_path, file_path)?;

    if !target.is_file() {
        return Ok(RollbackVerifyResult {
            path: target,
            status: RollbackVerifyStatus::NotFound,
            actual_hash: None,
        });
    }

    let current = patchkit_hash::hash_file(&target).await?;

    let status = if current == entry.before_hash {
        RollbackVerifyStatus::AlreadyOriginal
    } else if current == entry.after_hash {
        RollbackVerifyStatus::ReadyToRollback
    } else {
        RollbackVerifyStatus::HashMismatch
    };

    Ok(RollbackVerifyResult {
        path: target,
        status,
        actual_hash: Some(current),
    })
}
