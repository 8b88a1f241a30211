use std::str::FromStr;

use indexmap::IndexMap;
use uuid::Uuid;

use patchkit_purl::Purl;

use crate::events::{EventSink, RecoveryEvent};
use crate::model::{Manifest, PatchRecord};

/// External capability used to rebuild a record whose stored JSON failed to
/// parse. Returns the record together with the PURL the remote service
/// resolved it to, so the caller can confirm it still matches the manifest
/// key the broken record was filed under.
#[async_trait::async_trait]
pub trait Refetcher: Send + Sync {
    async fn refetch(
        &self,
        uuid: Uuid,
        purl: &Purl,
    ) -> Result<Option<(Purl, PatchRecord)>, String>;
}

/// Strict parse first; on failure, parse the document generically and
/// recover record-by-record. A top-level document that isn't JSON at all
/// yields an empty manifest plus a single `corrupted_manifest` event.
pub async fn recover_manifest(
    raw: &str,
    refetcher: Option<&dyn Refetcher>,
    sink: &dyn EventSink,
) -> Manifest {
    if let Ok(wire) = serde_json::from_str::<crate::model::ManifestWire>(raw) {
        return wire.into();
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        sink.emit(RecoveryEvent::CorruptedManifest {
            reason: "top-level document is not valid JSON".to_string(),
        });
        return Manifest::new();
    };

    let patches_obj = value
        .get("patches")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let mut recovered = IndexMap::new();

    for (key, record_value) in patches_obj {
        let purl = match Purl::from_str(&key) {
            Ok(purl) => purl,
            Err(err) => {
                sink.emit(RecoveryEvent::DiscardedPatchInvalidPurl {
                    key: key.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        match serde_json::from_value::<PatchRecord>(record_value.clone()) {
            Ok(record) => {
                recovered.insert(purl, record);
            }
            Err(err) => {
                reconstruct(
                    &purl,
                    &key,
                    &record_value,
                    &err.to_string(),
                    refetcher,
                    sink,
                    &mut recovered,
                )
                .await;
            }
        }
    }

    Manifest { patches: recovered }
}

async fn reconstruct(
    purl: &Purl,
    key: &str,
    record_value: &serde_json::Value,
    schema_error: &str,
    refetcher: Option<&dyn Refetcher>,
    sink: &dyn EventSink,
    recovered: &mut IndexMap<Purl, PatchRecord>,
) {
    let Some(refetcher) = refetcher else {
        sink.emit(RecoveryEvent::DiscardedPatchNoRefetcher {
            purl: key.to_string(),
            reason: schema_error.to_string(),
        });
        return;
    };

    let Some(uuid) = record_value
        .get("uuid")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
    else {
        sink.emit(RecoveryEvent::DiscardedPatchNoUuid {
            purl: key.to_string(),
            reason: schema_error.to_string(),
        });
        return;
    };

    match refetcher.refetch(uuid, purl).await {
        Err(error) => {
            sink.emit(RecoveryEvent::RecoveryError {
                purl: Some(key.to_string()),
                error,
            });
        }
        Ok(None) => {
            sink.emit(RecoveryEvent::DiscardedPatchRefetchFailed {
                purl: key.to_string(),
                uuid,
            });
        }
        Ok(Some((returned_purl, record))) => {
            if &returned_purl != purl {
                sink.emit(RecoveryEvent::DiscardedPatchPurlMismatch {
                    purl: key.to_string(),
                    returned_purl: returned_purl.to_string(),
                });
                return;
            }
            sink.emit(RecoveryEvent::RecoveredPatch {
                purl: key.to_string(),
                uuid,
            });
            recovered.insert(purl.clone(), record);
        }
    }
}
