//! The patch engine (C5): file verification, the apply/rollback state
//! machines, blob garbage collection, ephemeral one-off apply, and
//! missing-blob reconciliation. Everything here is collaborator-injected
//! (crawlers, fetcher, blob store) — nothing reaches for global state.

pub mod apply;
pub mod driver;
pub mod error;
pub mod gc;
pub mod oneoff;
pub mod reconcile;
pub mod rollback;
pub mod verify;

pub use apply::{apply_package_patch, ApplyOptions, ApplyOutcome};
pub use driver::{ApplyReport, Engine, EngineOptions, PackageOutcomeKind, PackageResult};
pub use error::EngineError;
pub use gc::{collect_garbage, GcReport};
pub use oneoff::{apply_one_off, OneOffApply};
pub use reconcile::reconcile_missing_blobs;
pub use rollback::{rollback_package_patch, select_candidates, RollbackOutcome};
pub use verify::{
    verify_file_patch, verify_file_rollback, RollbackVerifyResult, RollbackVerifyStatus,
    VerifyResult, VerifyStatus,
};
