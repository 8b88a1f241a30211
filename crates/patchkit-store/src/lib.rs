//! Content-addressed blob store: a flat directory where each blob is a file
//! named by the Git-SHA-256 hash of its content.
//!
//! Writes go through [`patchkit_fs::atomic_write`] so a reader never
//! observes a half-written blob. No sharding: the spec expects low-thousands
//! of blobs per store, well within a single directory's comfort zone.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use fs_err as fs;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error accessing blob store at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("blob store write failed for {hash}")]
    Write {
        hash: String,
        #[source]
        source: patchkit_fs::FsError,
    },
    #[error("blob {hash} is corrupt: filename does not match content digest {actual}")]
    Corrupt { hash: String, actual: String },
}

/// A single corrupt blob found during [`BlobStore::audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptBlob {
    pub hash: String,
    pub actual: String,
}

/// A flat, content-addressed directory of immutable blobs.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Open (without requiring it to yet exist) the blob store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(hash)
    }

    /// Write `content` under `hash`, creating the store directory if needed.
    ///
    /// Idempotent: if a blob with this hash already exists and its size
    /// matches, this is a no-op; a size mismatch (store corruption) is
    /// healed by overwriting, since the caller is expected to have verified
    /// `hash == Hasher(content)` before calling.
    pub fn put(&self, hash: &str, content: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(hash);
        if let Ok(metadata) = fs::metadata(&path) {
            if metadata.len() == content.len() as u64 {
                debug!(hash, "blob already present, skipping write");
                return Ok(());
            }
            warn!(hash, "existing blob size mismatch, overwriting");
        }

        patchkit_fs::atomic_write(&path, content).map_err(|source| StoreError::Write {
            hash: hash.to_string(),
            source,
        })
    }

    /// Read a blob's full content, or `None` if absent.
    pub fn get(&self, hash: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(hash)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: self.path_for(hash),
                source,
            }),
        }
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.path_for(hash).is_file()
    }

    /// List every hash currently present in the store.
    pub fn list(&self) -> Result<HashSet<String>, StoreError> {
        let mut hashes = HashSet::new();
        if !self.dir.exists() {
            return Ok(hashes);
        }

        for entry in walkdir::WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
        {
            let entry = entry.map_err(|err| StoreError::Io {
                path: self.dir.clone(),
                source: err.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walkdir failure")
                }),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            hashes.insert(name.to_string());
        }
        Ok(hashes)
    }

    /// Best-effort removal; absence is not an error.
    pub fn delete(&self, hash: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(hash)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: self.path_for(hash),
                source,
            }),
        }
    }

    /// Re-hash every blob in the store and report any whose filename does
    /// not match its content's Git-SHA-256 digest.
    pub fn audit(&self) -> Result<Vec<CorruptBlob>, StoreError> {
        let mut corrupt = Vec::new();
        for hash in self.list()? {
            let Some(content) = self.get(&hash)? else {
                continue;
            };
            let actual = patchkit_hash::hash_bytes(&content);
            if actual != hash {
                corrupt.push(CorruptBlob {
                    hash,
                    actual,
                });
            }
        }
        Ok(corrupt)
    }
}
