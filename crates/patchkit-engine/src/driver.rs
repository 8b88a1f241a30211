use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use patchkit_crawl::Crawler;
use patchkit_fetch::Fetcher;
use patchkit_manifest::Manifest;
use patchkit_purl::{Ecosystem, Purl};
use patchkit_store::BlobStore;

use crate::apply::{apply_package_patch, ApplyOptions};
use crate::error::EngineError;
use crate::reconcile::reconcile_missing_blobs;
use crate::rollback::{rollback_package_patch, select_candidates};

/// Engine-wide options, passed explicitly by the caller rather than read
/// from environment globals (spec.md §9's redesign note).
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub offline: bool,
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            offline: false,
            dry_run: false,
        }
    }
}

/// Per-package apply/rollback result, tagged with the package's identity
/// so a caller can report failures independently (§7's policy: "every
/// failing package is reported ... other packages are processed
/// independently").
#[derive(Debug)]
pub struct PackageResult {
    pub purl: Purl,
    pub outcome: Result<PackageOutcomeKind, EngineError>,
}

#[derive(Debug)]
pub enum PackageOutcomeKind {
    Applied { files_patched: Vec<PathBuf> },
    RolledBack { files_rolled_back: Vec<PathBuf> },
}

/// Aggregated result of applying/rolling back every candidate package.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub succeeded: Vec<PackageResult>,
    pub failed: Vec<PackageResult>,
}

impl ApplyReport {
    fn record(&mut self, result: PackageResult) {
        if result.outcome.is_ok() {
            self.succeeded.push(result);
        } else {
            self.failed.push(result);
        }
    }
}

/// Ties the manifest, blob store, and ecosystem crawlers together into the
/// multi-package apply/rollback drivers (§4.5.2, §4.5.3).
pub struct Engine<'a> {
    pub blobs: &'a BlobStore,
    pub fetcher: &'a dyn Fetcher,
    pub npm_crawler: &'a dyn Crawler,
    pub pypi_crawler: &'a dyn Crawler,
}

impl<'a> Engine<'a> {
    fn crawler_for(&self, ecosystem: Ecosystem) -> &dyn Crawler {
        match ecosystem {
            Ecosystem::Npm => self.npm_crawler,
            Ecosystem::Pypi => self.pypi_crawler,
        }
    }

    /// Apply every patch in `manifest`, dispatching on each PURL's
    /// ecosystem to find its installed location. PyPI qualified variants
    /// sharing a base PURL are tried in manifest order; once one succeeds
    /// (mutation or already-patched), the rest are skipped via
    /// `appliedBasePurls`.
    pub async fn apply_all(
        &self,
        manifest: &Manifest,
        crawl_options: &patchkit_crawl::CrawlOptions,
        options: EngineOptions,
    ) -> Result<ApplyReport, EngineError> {
        let required_hashes: HashSet<String> = manifest
            .patches
            .values()
            .flat_map(|record| record.files.values())
            .map(|entry| entry.after_hash.clone())
            .collect();
        reconcile_missing_blobs(&required_hashes, self.blobs, self.fetcher, options.offline)
            .await?;

        let mut report = ApplyReport::default();
        let installed = self.locate_all(manifest, crawl_options).await?;

        // Group manifest entries by base PURL so PyPI qualified variants
        // sharing one base are tried together: the first variant to
        // succeed (mutation or already-patched) wins, and the rest of the
        // group is skipped (`appliedBasePurls`). A group with more than
        // one variant that exhausts every candidate without success is
        // reported once as `VariantExhausted` rather than once per variant.
        let mut groups: indexmap::IndexMap<Purl, Vec<&Purl>> = indexmap::IndexMap::new();
        for purl in manifest.patches.keys() {
            groups.entry(purl.base()).or_default().push(purl);
        }

        for (base, variants) in groups {
            let mut succeeded = false;
            let mut last_result: Option<PackageResult> = None;

            for purl in &variants {
                let record = &manifest.patches[*purl];
                let apply_options = ApplyOptions {
                    dry_run: options.dry_run,
                };

                let outcome = match installed.packages.get(*purl) {
                    Some(package_path) => {
                        apply_package_patch(package_path, record, self.blobs, apply_options)
                            .await
                            .map(|outcome| PackageOutcomeKind::Applied {
                                files_patched: outcome.files_patched,
                            })
                    }
                    None => Err(installed.not_found_error(purl)),
                };

                let ok = outcome.is_ok();
                last_result = Some(PackageResult {
                    purl: (*purl).clone(),
                    outcome,
                });
                if ok {
                    succeeded = true;
                    break;
                }
            }

            if succeeded {
                report.record(last_result.expect("at least one variant was tried"));
            } else if variants.len() > 1 {
                report.record(PackageResult {
                    purl: base.clone(),
                    outcome: Err(EngineError::VariantExhausted { base_purl: base }),
                });
            } else if let Some(result) = last_result {
                report.record(result);
            }
        }

        Ok(report)
    }

    /// Roll back every candidate selected by `identifier` (§4.5.3's
    /// selector).
    pub async fn rollback(
        &self,
        manifest: &Manifest,
        crawl_options: &patchkit_crawl::CrawlOptions,
        identifier: Option<&str>,
        offline: bool,
    ) -> Result<ApplyReport, EngineError> {
        let candidates = select_candidates(manifest, identifier)?;

        let required_hashes: HashSet<String> = candidates
            .iter()
            .flat_map(|(_, record)| record.files.values())
            .map(|entry| entry.before_hash.clone())
            .collect();
        reconcile_missing_blobs(&required_hashes, self.blobs, self.fetcher, offline).await?;

        let mut report = ApplyReport::default();
        let installed = self.locate_all(manifest, crawl_options).await?;

        for (purl, record) in candidates {
            let Some(package_path) = installed.packages.get(purl) else {
                report.record(PackageResult {
                    purl: purl.clone(),
                    outcome: Err(installed.not_found_error(purl)),
                });
                continue;
            };

            let outcome = rollback_package_patch(package_path, record, self.blobs)
                .await
                .map(|outcome| PackageOutcomeKind::RolledBack {
                    files_rolled_back: outcome.files_rolled_back,
                });

            report.record(PackageResult {
                purl: purl.clone(),
                outcome,
            });
        }

        Ok(report)
    }

    /// Resolve every manifest PURL to its installed package directory by
    /// dispatching to the matching ecosystem crawler's `find_by_purls`.
    /// Ecosystems with zero discovered search roots are reported
    /// separately (§7 `EcosystemRootMissing`) rather than folded into the
    /// per-package `FileNotFound` case, and don't stop other ecosystems
    /// from being located.
    async fn locate_all(
        &self,
        manifest: &Manifest,
        crawl_options: &patchkit_crawl::CrawlOptions,
    ) -> Result<Located, EngineError> {
        let mut by_ecosystem: HashMap<Ecosystem, Vec<Purl>> = HashMap::new();
        for purl in manifest.patches.keys() {
            by_ecosystem
                .entry(purl.ecosystem())
                .or_default()
                .push(purl.clone());
        }

        let mut packages = HashMap::new();
        let mut root_missing_ecosystems = HashSet::new();
        for (ecosystem, purls) in by_ecosystem {
            let crawler = self.crawler_for(ecosystem);
            let roots = crawler.get_search_roots(crawl_options).await?;
            if roots.is_empty() {
                root_missing_ecosystems.insert(ecosystem);
                continue;
            }
            for root in roots {
                let found = crawler.find_by_purls(&root, &purls).await?;
                for (purl, package) in found {
                    packages.entry(purl).or_insert(package.path);
                }
            }
        }

        Ok(Located {
            packages,
            root_missing_ecosystems,
        })
    }
}

struct Located {
    packages: HashMap<Purl, PathBuf>,
    root_missing_ecosystems: HashSet<Ecosystem>,
}

impl Located {
    fn not_found_error(&self, purl: &Purl) -> EngineError {
        if self.root_missing_ecosystems.contains(&purl.ecosystem()) {
            EngineError::EcosystemRootMissing {
                ecosystem: purl.ecosystem(),
            }
        } else {
            EngineError::FileNotFound {
                path: PathBuf::from(purl.name()),
            }
        }
    }
}
