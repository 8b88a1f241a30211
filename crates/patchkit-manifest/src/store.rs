use std::path::{Path, PathBuf};

use fs_err as fs;
use patchkit_purl::Purl;

use crate::events::{EventSink, TracingEventSink};
use crate::model::{Manifest, ManifestWire};
use crate::recovery::{recover_manifest, Refetcher};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("i/o error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize manifest")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write manifest atomically")]
    Write(#[source] patchkit_fs::FsError),
}

/// The durable manifest at `<project>/.socket/manifest.json`.
///
/// Concurrent writers are not supported: the store assumes cooperative
/// single-process access, per the spec's documented (not guarded) resource
/// model.
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest, recovering from a corrupt or partially invalid
    /// document. Returns an empty manifest (never an error) if the file is
    /// missing, matching first-run semantics (the manifest is created by the
    /// first successful download).
    pub async fn load(
        &self,
        refetcher: Option<&dyn Refetcher>,
        sink: &dyn EventSink,
    ) -> Result<Manifest, ManifestError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Manifest::new());
            }
            Err(source) => {
                return Err(ManifestError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        Ok(recover_manifest(&raw, refetcher, sink).await)
    }

    /// Load using the default [`TracingEventSink`], for callers that don't
    /// need to inspect recovery events themselves.
    pub async fn load_with_tracing(
        &self,
        refetcher: Option<&dyn Refetcher>,
    ) -> Result<Manifest, ManifestError> {
        self.load(refetcher, &TracingEventSink).await
    }

    /// Serialize and persist the manifest: 2-space JSON, trailing newline,
    /// key order as currently held by the in-memory map (callers are
    /// expected to have done their read-modify-write dance already; this is
    /// the "write" half).
    pub fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let wire = ManifestWire {
            patches: manifest.patches.clone(),
        };
        let mut content =
            serde_json::to_vec_pretty(&wire).map_err(ManifestError::Serialize)?;
        content.push(b'\n');

        patchkit_fs::atomic_write(&self.path, &content).map_err(ManifestError::Write)
    }
}

/// The result of comparing two manifest snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub added: Vec<Purl>,
    pub removed: Vec<Purl>,
    /// Modified is detected by `uuid` inequality only, never by deep file
    /// comparison.
    pub modified: Vec<Purl>,
}

pub fn diff(old: &Manifest, new: &Manifest) -> ManifestDiff {
    let mut result = ManifestDiff::default();

    for (purl, new_record) in &new.patches {
        match old.patches.get(purl) {
            None => result.added.push(purl.clone()),
            Some(old_record) if old_record.uuid != new_record.uuid => {
                result.modified.push(purl.clone());
            }
            Some(_) => {}
        }
    }

    for purl in old.patches.keys() {
        if !new.patches.contains_key(purl) {
            result.removed.push(purl.clone());
        }
    }

    result
}
