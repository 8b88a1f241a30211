use std::path::PathBuf;

use patchkit_purl::Purl;

/// The error taxonomy of §7: every row is a tagged value surfaced from a
/// per-file or per-package operation and aggregated at the driver, never a
/// panic. `PostWriteHashMismatch` and unrecoverable blob-store I/O are the
/// only fatal conditions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("hash mismatch for {path}: expected before={before} or after={after}, found {actual}")]
    HashMismatch {
        path: PathBuf,
        before: String,
        after: String,
        actual: String,
    },

    #[error("blob(s) missing from store: {hashes:?}")]
    BlobMissing { hashes: Vec<String> },

    #[error("post-write hash mismatch for {path}: expected {expected}, found {actual}")]
    PostWriteHashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("no patch found for identifier {identifier:?}")]
    IdentifierNotFound { identifier: String },

    #[error("no matching variant for {base_purl}")]
    VariantExhausted { base_purl: Purl },

    #[error("no search roots discovered for ecosystem {ecosystem}")]
    EcosystemRootMissing { ecosystem: patchkit_purl::Ecosystem },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] patchkit_hash::HashError),

    #[error(transparent)]
    Store(#[from] patchkit_store::StoreError),

    #[error(transparent)]
    Fs(#[from] patchkit_fs::FsError),

    #[error(transparent)]
    Crawl(#[from] patchkit_crawl::CrawlError),
}
