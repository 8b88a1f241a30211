//! The durable patch manifest: schema, corruption recovery, diffing, and
//! read-validate-modify-write persistence to `.socket/manifest.json`.

mod clock;
mod events;
mod model;
mod recovery;
mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use events::{CollectingEventSink, EventSink, RecoveryEvent, TracingEventSink};
pub use model::{FileEntry, Manifest, PatchRecord, Severity, Tier, VulnerabilityRecord};
pub use recovery::{recover_manifest, Refetcher};
pub use store::{diff, ManifestDiff, ManifestError, ManifestStore};
