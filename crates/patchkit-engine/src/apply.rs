use std::path::{Path, PathBuf};

use patchkit_manifest::PatchRecord;
use patchkit_store::BlobStore;

use crate::error::EngineError;
use crate::verify::{verify_file_patch, VerifyResult, VerifyStatus};

/// Result of applying one package's patch (§4.5.2).
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub verifications: Vec<VerifyResult>,
    pub files_patched: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    pub dry_run: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self { dry_run: false }
    }
}

/// Apply one package's patch record against `package_path`, all-or-nothing:
/// step 1 verifies every file before step 4 mutates any. `not-found` or
/// `hash-mismatch` on any file fails the whole package untouched.
pub async fn apply_package_patch(
    package_path: &Path,
    record: &PatchRecord,
    blobs: &BlobStore,
    options: ApplyOptions,
) -> Result<ApplyOutcome, EngineError> {
    let mut verifications = Vec::with_capacity(record.files.len());
    for (file_path, entry) in &record.files {
        let result = verify_file_patch(package_path, file_path, entry).await?;
        match result.status {
            VerifyStatus::NotFound => {
                return Err(EngineError::FileNotFound { path: result.path });
            }
            VerifyStatus::HashMismatch => {
                return Err(EngineError::HashMismatch {
                    path: result.path,
                    before: entry.before_hash.clone(),
                    after: entry.after_hash.clone(),
                    actual: result.actual_hash.clone().unwrap_or_default(),
                });
            }
            VerifyStatus::AlreadyPatched | VerifyStatus::Ready => {}
        }
        verifications.push(result);
    }

    let already_done = verifications
        .iter()
        .all(|v| v.status == VerifyStatus::AlreadyPatched);
    if already_done || options.dry_run {
        return Ok(ApplyOutcome {
            verifications,
            files_patched: Vec::new(),
        });
    }

    let mut files_patched = Vec::new();
    for ((_, entry), verification) in record.files.iter().zip(&verifications) {
        if verification.status == VerifyStatus::AlreadyPatched {
            continue;
        }

        let target = verification.path.clone();
        let content = blobs
            .get(&entry.after_hash)?
            .ok_or_else(|| EngineError::BlobMissing {
                hashes: vec![entry.after_hash.clone()],
            })?;

        patchkit_fs::atomic_write(&target, &content)?;

        let post_write_hash = patchkit_hash::hash_file(&target).await?;
        if post_write_hash != entry.after_hash {
            return Err(EngineError::PostWriteHashMismatch {
                path: target,
                expected: entry.after_hash.clone(),
                actual: post_write_hash,
            });
        }

        files_patched.push(target);
    }

    Ok(ApplyOutcome {
        verifications,
        files_patched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use patchkit_manifest::{FileEntry, Tier};
    use patchkit_hash::hash_bytes;
    use uuid::Uuid;

    fn record(files: IndexMap<String, FileEntry>) -> PatchRecord {
        PatchRecord {
            uuid: Uuid::new_v4(),
            exported_at: jiff::Timestamp::from_second(0).unwrap(),
            files,
            vulnerabilities: IndexMap::new(),
            description: String::new(),
            license: String::new(),
            tier: Tier::Free,
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn dry_run_reports_no_mutations() {
        let package_dir = tempfile::tempdir().unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(blob_dir.path().to_path_buf());

        std::fs::write(package_dir.path().join("index.js"), b"original").unwrap();
        let before = hash_bytes(b"original").to_string();
        let after = hash_bytes(b"patched").to_string();
        blobs.put(&after, b"patched").unwrap();

        let mut files = IndexMap::new();
        files.insert("package/index.js".to_string(), FileEntry::new(before, after));
        let record = record(files);

        let outcome = apply_package_patch(
            package_dir.path(),
            &record,
            &blobs,
            ApplyOptions { dry_run: true },
        )
        .await
        .unwrap();

        assert!(outcome.files_patched.is_empty());
        let content = std::fs::read(package_dir.path().join("index.js")).unwrap();
        assert_eq!(content, b"original");
    }

    #[tokio::test]
    async fn tampered_file_fails_fast_without_mutation() {
        let package_dir = tempfile::tempdir().unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(blob_dir.path().to_path_buf());

        std::fs::write(package_dir.path().join("index.js"), b"user edits").unwrap();
        let after = hash_bytes(b"patched").to_string();
        blobs.put(&after, b"patched").unwrap();

        let mut files = IndexMap::new();
        files.insert(
            "package/index.js".to_string(),
            FileEntry::new("before-hash", after),
        );
        let record = record(files);

        let result = apply_package_patch(
            package_dir.path(),
            &record,
            &blobs,
            ApplyOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(EngineError::HashMismatch { .. })));
        let content = std::fs::read(package_dir.path().join("index.js")).unwrap();
        assert_eq!(content, b"user edits");
    }

    #[tokio::test]
    async fn successful_apply_writes_after_blob() {
        let package_dir = tempfile::tempdir().unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(blob_dir.path().to_path_buf());

        std::fs::write(package_dir.path().join("index.js"), b"original").unwrap();
        let before = hash_bytes(b"original").to_string();
        let after = hash_bytes(b"patched").to_string();
        blobs.put(&after, b"patched").unwrap();

        let mut files = IndexMap::new();
        files.insert("package/index.js".to_string(), FileEntry::new(before, after));
        let record = record(files);

        let outcome = apply_package_patch(
            package_dir.path(),
            &record,
            &blobs,
            ApplyOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.files_patched.len(), 1);
        let content = std::fs::read(package_dir.path().join("index.js")).unwrap();
        assert_eq!(content, b"patched");
    }

    #[tokio::test]
    async fn already_patched_package_is_a_noop() {
        let package_dir = tempfile::tempdir().unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(blob_dir.path().to_path_buf());

        std::fs::write(package_dir.path().join("index.js"), b"patched").unwrap();
        let after = hash_bytes(b"patched").to_string();

        let mut files = IndexMap::new();
        files.insert(
            "package/index.js".to_string(),
            FileEntry::new("before-hash", after),
        );
        let record = record(files);

        let outcome = apply_package_patch(
            package_dir.path(),
            &record,
            &blobs,
            ApplyOptions::default(),
        )
        .await
        .unwrap();

        assert!(outcome.files_patched.is_empty());
    }

    #[tokio::test]
    async fn missing_blob_fails_with_blob_missing() {
        let package_dir = tempfile::tempdir().unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(blob_dir.path().to_path_buf());

        std::fs::write(package_dir.path().join("index.js"), b"original").unwrap();
        let before = hash_bytes(b"original").to_string();

        let mut files = IndexMap::new();
        files.insert(
            "package/index.js".to_string(),
            FileEntry::new(before, "missing-hash"),
        );
        let record = record(files);

        let result = apply_package_patch(
            package_dir.path(),
            &record,
            &blobs,
            ApplyOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(EngineError::BlobMissing { .. })));
    }
}
