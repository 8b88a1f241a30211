//! The `Fetcher` collaborator interface (§6): an external capability the
//! patch engine calls into for two things only — pulling a missing blob by
//! hash, and refetching a patch record by UUID during manifest recovery or
//! download. Search/telemetry/CLI surfaces are out of the core's scope and
//! are not modeled here.

use std::collections::HashMap;
use std::sync::Mutex;

use patchkit_manifest::PatchRecord;
use patchkit_purl::Purl;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchData {
    pub purl: Purl,
    pub record: PatchRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(String),
}

/// External capability consumed by the blob-missing reconciliation path and
/// by manifest recovery. A CLI wires this up against an HTTP client;
/// nothing in this crate talks to the network.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_blob(&self, hash: &str) -> Result<Option<Vec<u8>>, FetchError>;

    async fn fetch_patch(
        &self,
        org_slug: Option<&str>,
        uuid: Uuid,
    ) -> Result<Option<PatchData>, FetchError>;
}

/// Adapts any [`Fetcher`] into a [`patchkit_manifest::Refetcher`] for use
/// during manifest recovery.
pub struct FetcherRefetcher<'a> {
    fetcher: &'a dyn Fetcher,
    org_slug: Option<String>,
}

impl<'a> FetcherRefetcher<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, org_slug: Option<String>) -> Self {
        Self { fetcher, org_slug }
    }
}

#[async_trait::async_trait]
impl<'a> patchkit_manifest::Refetcher for FetcherRefetcher<'a> {
    async fn refetch(
        &self,
        uuid: Uuid,
        _purl: &Purl,
    ) -> Result<Option<(Purl, PatchRecord)>, String> {
        self.fetcher
            .fetch_patch(self.org_slug.as_deref(), uuid)
            .await
            .map(|maybe| maybe.map(|data| (data.purl, data.record)))
            .map_err(|err| err.to_string())
    }
}

/// Always offline: every call returns `None`. Used to exercise `offline`
/// scenarios without standing up a real collaborator.
#[derive(Debug, Default)]
pub struct NullFetcher;

#[async_trait::async_trait]
impl Fetcher for NullFetcher {
    async fn fetch_blob(&self, _hash: &str) -> Result<Option<Vec<u8>>, FetchError> {
        Ok(None)
    }

    async fn fetch_patch(
        &self,
        _org_slug: Option<&str>,
        _uuid: Uuid,
    ) -> Result<Option<PatchData>, FetchError> {
        Ok(None)
    }
}

/// An in-memory `Fetcher` backed by maps the test registers ahead of time.
#[derive(Debug, Default)]
pub struct MapFetcher {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    patches: Mutex<HashMap<Uuid, PatchData>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, hash: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.blobs.lock().unwrap().insert(hash.into(), content.into());
        self
    }

    pub fn with_patch(self, data: PatchData) -> Self {
        self.patches.lock().unwrap().insert(data.record.uuid, data);
        self
    }
}

#[async_trait::async_trait]
impl Fetcher for MapFetcher {
    async fn fetch_blob(&self, hash: &str) -> Result<Option<Vec<u8>>, FetchError> {
        Ok(self.blobs.lock().unwrap().get(hash).cloned())
    }

    async fn fetch_patch(
        &self,
        _org_slug: Option<&str>,
        uuid: Uuid,
    ) -> Result<Option<PatchData>, FetchError> {
        Ok(self.patches.lock().unwrap().get(&uuid).cloned())
    }
}
