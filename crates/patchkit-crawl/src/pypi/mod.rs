//! PyPI crawler: resolves virtualenv and global `site-packages`
//! directories and reads installed distributions from `*.dist-info`
//! metadata.

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use fs_err as fs;
use patchkit_purl::{canonicalize_pypi_name, Ecosystem, Purl};

use crate::{run_command_stdout, CrawlBatches, CrawlError, CrawlOptions, CrawledPackage, Crawler};

#[derive(Debug, Default)]
pub struct PypiCrawler;

impl PypiCrawler {
    pub fn new() -> Self {
        Self
    }

    fn local_roots(cwd: &Path) -> Vec<PathBuf> {
        let mut roots = Vec::new();

        if let Ok(venv) = env::var("VIRTUAL_ENV") {
            if let Some(site_packages) = site_packages_from_venv(Path::new(&venv)) {
                roots.push(site_packages);
            }
        }

        for candidate in [".venv", "venv"] {
            let dir = cwd.join(candidate);
            if let Some(site_packages) = site_packages_from_venv(&dir) {
                roots.push(site_packages);
            }
        }

        dedup_canonical(roots)
    }

    async fn global_roots() -> Vec<PathBuf> {
        let mut roots = Vec::new();

        if let Some(output) = run_command_stdout(
            "python3",
            &[
                "-c",
                "import site; print('\\n'.join(site.getsitepackages()))",
            ],
        )
        .await
        {
            roots.extend(output.lines().map(PathBuf::from));
        }

        for well_known in well_known_global_roots() {
            roots.push(well_known);
        }

        dedup_canonical(roots)
    }
}

#[cfg(unix)]
fn well_known_global_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/lib/python3/dist-packages"),
        PathBuf::from("/usr/local/lib/python3/dist-packages"),
    ]
}

#[cfg(windows)]
fn well_known_global_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("C:\\Python3\\Lib\\site-packages")]
}

#[cfg(not(any(unix, windows)))]
fn well_known_global_roots() -> Vec<PathBuf> {
    Vec::new()
}

fn dedup_canonical(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for root in roots {
        let key = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        if seen.insert(key) {
            out.push(root);
        }
    }
    out
}

/// `<venv>/lib/python3.*/site-packages` on Unix, `<venv>/Lib/site-packages`
/// on Windows. Returns `None` if `venv` doesn't look like a virtualenv.
fn site_packages_from_venv(venv: &Path) -> Option<PathBuf> {
    if !venv.is_dir() {
        return None;
    }

    #[cfg(windows)]
    {
        let candidate = venv.join("Lib").join("site-packages");
        return candidate.is_dir().then_some(candidate);
    }

    #[cfg(not(windows))]
    {
        let lib = venv.join("lib");
        let entries = fs::read_dir(&lib).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with("python3.") {
                let candidate = entry.path().join("site-packages");
                if candidate.is_dir() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// Parse the RFC822-style `METADATA` file: `Key: value` lines up to the
/// first blank line (which separates headers from the long description).
fn parse_metadata_headers(raw: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in raw.lines() {
        if line.is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        headers
            .entry(key.trim().to_string())
            .or_insert_with(|| value.trim().to_string());
    }
    headers
}

fn walk_site_packages(root: &Path, seen: &mut HashSet<Purl>, out: &mut Vec<CrawledPackage>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".dist-info") {
            continue;
        }

        let metadata_path = entry.path().join("METADATA");
        let Ok(raw) = fs::read_to_string(&metadata_path) else {
            continue;
        };
        let headers = parse_metadata_headers(&raw);
        let (Some(raw_name), Some(version)) = (headers.get("Name"), headers.get("Version")) else {
            continue;
        };

        let canonical_name = canonicalize_pypi_name(raw_name);
        let purl = Purl::new(Ecosystem::Pypi, canonical_name.clone(), version.clone());

        if !seen.insert(purl.clone()) {
            continue;
        }

        out.push(CrawledPackage {
            purl,
            path: root.to_path_buf(),
            name: canonical_name,
            version: version.clone(),
            namespace: None,
        });
    }
}

#[async_trait::async_trait]
impl Crawler for PypiCrawler {
    async fn get_search_roots(&self, options: &CrawlOptions) -> Result<Vec<PathBuf>, CrawlError> {
        let mut roots = Self::local_roots(&options.cwd);
        if options.global {
            if let Some(prefix) = &options.global_prefix {
                roots.push(prefix.clone());
            } else {
                roots.extend(Self::global_roots().await);
            }
        }
        Ok(roots)
    }

    async fn crawl_all(&self, options: &CrawlOptions) -> Result<Vec<CrawledPackage>, CrawlError> {
        let roots = self.get_search_roots(options).await?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for root in roots {
            walk_site_packages(&root, &mut seen, &mut out);
        }
        Ok(out)
    }

    fn crawl_batches(&self, options: CrawlOptions) -> CrawlBatches {
        let batch_size = options.batch_size;
        let crawler = PypiCrawler::new();
        let mut batches = CrawlBatches::new(Vec::new(), batch_size, move |_root: &Path| {
            let options = options.clone();
            Box::pin(async move { crawler.crawl_all(&options).await })
        });
        batches.seed_with_single_pseudo_root();
        batches
    }

    async fn find_by_purls(
        &self,
        root: &Path,
        purls: &[Purl],
    ) -> Result<HashMap<Purl, CrawledPackage>, CrawlError> {
        // Multiple qualified variants can share one base PURL (one on-disk
        // distribution, several candidate patches); key by base so every
        // variant gets its own `found` entry instead of only the last one
        // inserted.
        let mut lookup: HashMap<(String, String), Vec<&Purl>> = HashMap::new();
        for purl in purls {
            if purl.ecosystem() != Ecosystem::Pypi {
                continue;
            }
            let base = purl.base();
            let key = (canonicalize_pypi_name(base.name()), base.version().to_string());
            lookup.entry(key).or_default().push(purl);
        }

        let mut found = HashMap::new();
        let Ok(entries) = fs::read_dir(root) else {
            return Ok(found);
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".dist-info") {
                continue;
            }
            let metadata_path = entry.path().join("METADATA");
            let Ok(raw) = fs::read_to_string(&metadata_path) else {
                continue;
            };
            let headers = parse_metadata_headers(&raw);
            let (Some(raw_name), Some(version)) = (headers.get("Name"), headers.get("Version"))
            else {
                continue;
            };
            let key = (canonicalize_pypi_name(raw_name), version.clone());
            let Some(matching_purls) = lookup.get(&key) else {
                continue;
            };
            for purl in matching_purls {
                found.insert(
                    (*purl).clone(),
                    CrawledPackage {
                        purl: (*purl).clone(),
                        path: root.to_path_buf(),
                        name: key.0.clone(),
                        version: version.clone(),
                        namespace: None,
                    },
                );
            }
        }
        Ok(found)
    }
}
