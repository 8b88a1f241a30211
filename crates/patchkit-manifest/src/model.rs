use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use patchkit_purl::Purl;

/// Before/after hash pair for one patched file. `path` (the manifest key)
/// may carry a leading `package/` segment, stripped before joining with a
/// package's on-disk directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub before_hash: String,
    pub after_hash: String,
}

impl FileEntry {
    pub fn new(before_hash: impl Into<String>, after_hash: impl Into<String>) -> Self {
        Self {
            before_hash: before_hash.into(),
            after_hash: after_hash.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub cves: Vec<String>,
    pub summary: String,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

/// One patch: the set of file-level before/after hashes plus metadata.
/// `uuid` is the patch's stable identity, independent of the PURL it is
/// currently filed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRecord {
    pub uuid: Uuid,
    pub exported_at: jiff::Timestamp,
    pub files: IndexMap<String, FileEntry>,
    #[serde(default)]
    pub vulnerabilities: IndexMap<String, VulnerabilityRecord>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    pub tier: Tier,
    /// Unknown top-level fields, preserved on round-trip where possible.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The durable index: every known patch, keyed by PURL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub patches: IndexMap<Purl, PatchRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            patches: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Find a patch by UUID via linear search, used by the rollback
    /// selector when a caller addresses a patch by UUID rather than PURL.
    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<(&Purl, &PatchRecord)> {
        self.patches.iter().find(|(_, record)| record.uuid == uuid)
    }
}

/// The wire representation: `{ "patches": { <purl>: <record>, ... } }`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ManifestWire {
    pub patches: IndexMap<Purl, PatchRecord>,
}

impl From<Manifest> for ManifestWire {
    fn from(manifest: Manifest) -> Self {
        ManifestWire {
            patches: manifest.patches,
        }
    }
}

impl From<ManifestWire> for Manifest {
    fn from(wire: ManifestWire) -> Self {
        Manifest {
            patches: wire.patches,
        }
    }
}
