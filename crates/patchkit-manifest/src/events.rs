use uuid::Uuid;

/// Structured events emitted while recovering a manifest, delivered to an
/// injected [`EventSink`] rather than logged from a global singleton.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    /// The top-level document was not valid JSON at all.
    CorruptedManifest { reason: String },
    /// A record was rebuilt via the injected refetch capability.
    RecoveredPatch { purl: String, uuid: Uuid },
    /// The record failed schema validation and no refetcher was available to
    /// attempt reconstruction.
    DiscardedPatchNoRefetcher { purl: String, reason: String },
    /// The record failed schema validation and had no recoverable UUID to
    /// refetch by.
    DiscardedPatchNoUuid { purl: String, reason: String },
    /// The injected refetch capability found nothing.
    DiscardedPatchRefetchFailed { purl: String, uuid: Uuid },
    /// The refetched record's PURL did not match the manifest key it was
    /// filed under.
    DiscardedPatchPurlMismatch {
        purl: String,
        returned_purl: String,
    },
    /// The manifest key itself was not a syntactically valid PURL.
    DiscardedPatchInvalidPurl { key: String, reason: String },
    /// The refetch capability itself errored.
    RecoveryError { purl: Option<String>, error: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RecoveryEvent);
}

/// Emits every event as a `tracing` event at an appropriate level, for
/// binaries that don't wire up their own sink.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: RecoveryEvent) {
        match event {
            RecoveryEvent::CorruptedManifest { reason } => {
                tracing::error!(reason, "corrupted_manifest");
            }
            RecoveryEvent::RecoveredPatch { purl, uuid } => {
                tracing::info!(purl, %uuid, "recovered_patch");
            }
            RecoveryEvent::DiscardedPatchNoRefetcher { purl, reason } => {
                tracing::warn!(purl, reason, "discarded_patch_no_refetcher");
            }
            RecoveryEvent::DiscardedPatchNoUuid { purl, reason } => {
                tracing::warn!(purl, reason, "discarded_patch_no_uuid");
            }
            RecoveryEvent::DiscardedPatchRefetchFailed { purl, uuid } => {
                tracing::warn!(purl, %uuid, "discarded_patch_refetch_failed");
            }
            RecoveryEvent::DiscardedPatchPurlMismatch {
                purl,
                returned_purl,
            } => {
                tracing::warn!(purl, returned_purl, "discarded_patch_purl_mismatch");
            }
            RecoveryEvent::DiscardedPatchInvalidPurl { key, reason } => {
                tracing::warn!(key, reason, "discarded_patch_invalid_purl");
            }
            RecoveryEvent::RecoveryError { purl, error } => {
                tracing::error!(purl, error, "recovery_error");
            }
        }
    }
}

/// Collects events in-memory; used by tests and anywhere a caller wants to
/// inspect what recovery did rather than just log it.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: std::sync::Mutex<Vec<RecoveryEvent>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecoveryEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: RecoveryEvent) {
        self.events.lock().unwrap().push(event);
    }
}
