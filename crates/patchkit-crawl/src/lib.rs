//! Ecosystem-aware package discovery (C4): locate an installed package's
//! on-disk directory from a PURL, and enumerate everything installed under
//! a set of search roots.
//!
//! One polymorphic [`Crawler`] trait, two concrete implementations
//! ([`npm::NpmCrawler`], [`pypi::PypiCrawler`]); the patch engine dispatches
//! on the PURL's ecosystem tag and never downcasts.

pub mod npm;
pub mod pypi;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use patchkit_purl::Purl;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("i/o error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Default batch emission size for [`Crawler::crawl_batches`].
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub cwd: PathBuf,
    /// Also scan system/user-global package roots.
    pub global: bool,
    /// Explicit global root, overriding auto-detection.
    pub global_prefix: Option<PathBuf>,
    pub batch_size: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            global: false,
            global_prefix: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// One package found on disk during a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledPackage {
    pub purl: Purl,
    /// The package's own directory (npm) or the enclosing site-packages
    /// directory (pypi — installs spray files across site-packages rather
    /// than confining themselves to a subdirectory).
    pub path: PathBuf,
    pub name: String,
    pub version: String,
    pub namespace: Option<String>,
}

/// A lazy, finite sequence of crawl batches. Each call to [`next_batch`]
/// walks just enough of the remaining search roots to fill one batch.
///
/// [`next_batch`]: CrawlBatches::next_batch
pub struct CrawlBatches {
    pending: Vec<CrawledPackage>,
    remaining_roots: std::vec::IntoIter<PathBuf>,
    batch_size: usize,
    walker: Box<dyn Fn(&Path) -> futures::future::BoxFuture<'static, Result<Vec<CrawledPackage>, CrawlError>> + Send>,
    seen: std::collections::HashSet<Purl>,
}

impl CrawlBatches {
    pub(crate) fn new(
        roots: Vec<PathBuf>,
        batch_size: usize,
        walker: impl Fn(&Path) -> futures::future::BoxFuture<'static, Result<Vec<CrawledPackage>, CrawlError>>
            + Send
            + 'static,
    ) -> Self {
        Self {
            pending: Vec::new(),
            remaining_roots: roots.into_iter(),
            batch_size: batch_size.max(1),
            walker: Box::new(walker),
            seen: std::collections::HashSet::new(),
        }
    }

    /// Both ecosystem crawlers currently build their batches from a single
    /// eager `crawl_all` walk rather than a true root-by-root lazy walk;
    /// seed the root queue with one placeholder so `next_batch` invokes
    /// the walker exactly once.
    pub(crate) fn seed_with_single_pseudo_root(&mut self) {
        self.remaining_roots = vec![PathBuf::new()].into_iter();
    }

    pub async fn next_batch(&mut self) -> Result<Option<Vec<CrawledPackage>>, CrawlError> {
        while self.pending.len() < self.batch_size {
            let Some(root) = self.remaining_roots.next() else {
                break;
            };
            for package in (self.walker)(&root).await? {
                if self.seen.insert(package.purl.clone()) {
                    self.pending.push(package);
                }
            }
        }

        if self.pending.is_empty() {
            return Ok(None);
        }

        let drain = self.pending.len().min(self.batch_size);
        let batch = self.pending.drain(..drain).collect();
        Ok(Some(batch))
    }
}

/// Per-ecosystem package discovery. Implemented by [`npm::NpmCrawler`] and
/// [`pypi::PypiCrawler`]; both expose identical signatures over
/// ecosystem-specific internals.
#[async_trait::async_trait]
pub trait Crawler: Send + Sync {
    async fn get_search_roots(&self, options: &CrawlOptions) -> Result<Vec<PathBuf>, CrawlError>;

    async fn crawl_all(&self, options: &CrawlOptions) -> Result<Vec<CrawledPackage>, CrawlError>;

    fn crawl_batches(&self, options: CrawlOptions) -> CrawlBatches;

    async fn find_by_purls(
        &self,
        root: &Path,
        purls: &[Purl],
    ) -> Result<HashMap<Purl, CrawledPackage>, CrawlError>;
}

/// Run `program args...` and return trimmed stdout if it exits successfully
/// and prints something; a missing binary or non-zero exit is treated as
/// "no root from this source", not an error — package managers being
/// absent from `$PATH` is an expected environment.
pub(crate) async fn run_command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
