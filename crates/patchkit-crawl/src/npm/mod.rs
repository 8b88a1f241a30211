//! npm crawler: walks `node_modules` trees, including pnpm's symlinked
//! layout, and resolves scoped (`@scope/name`) packages.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use fs_err as fs;
use patchkit_purl::{Ecosystem, Purl};
use serde::Deserialize;

use crate::{run_command_stdout, CrawlBatches, CrawlError, CrawlOptions, CrawledPackage, Crawler};

/// Build output directories unlikely to contain a real workspace member;
/// never descended into while hunting for workspace `node_modules` roots.
/// `node_modules` itself is handled by a dedicated branch below (recorded
/// as a root, not recursed into — its contents are enumerated separately
/// by the package walk), and hidden directories are skipped unconditionally.
const PRUNED_DIR_NAMES: &[&str] = &[
    "dist",
    "build",
    "coverage",
    "tmp",
    "temp",
    "__pycache__",
    "vendor",
];

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: Option<serde_json::Value>,
    version: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct NpmCrawler;

impl NpmCrawler {
    pub fn new() -> Self {
        Self
    }

    fn local_roots(cwd: &Path) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        let direct = cwd.join("node_modules");
        if direct.is_dir() {
            roots.push(direct);
        }
        find_workspace_node_modules(cwd, &mut roots);
        roots
    }

    async fn global_roots(global_prefix: Option<&Path>) -> Vec<PathBuf> {
        if let Some(prefix) = global_prefix {
            return vec![prefix.join("node_modules")];
        }

        let mut roots = Vec::new();
        if let Some(root) = run_command_stdout("npm", &["root", "-g"]).await {
            roots.push(PathBuf::from(root));
        }
        if let Some(root) = run_command_stdout("pnpm", &["root", "-g"]).await {
            roots.push(PathBuf::from(root));
        }
        if let Some(dir) = run_command_stdout("yarn", &["global", "dir"]).await {
            roots.push(PathBuf::from(dir).join("node_modules"));
        }
        roots
    }
}

fn find_workspace_node_modules(dir: &Path, roots: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
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
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if name == "node_modules" {
            if !roots.contains(&path) {
                roots.push(path);
            }
            continue;
        }
        if PRUNED_DIR_NAMES.contains(&name) {
            continue;
        }
        find_workspace_node_modules(&path, roots);
    }
}

/// Walk one `node_modules` root, recursing into `@scope` directories and
/// into nested `node_modules` of real (non-symlinked) candidates.
fn walk_node_modules(root: &Path, seen: &mut HashSet<Purl>, out: &mut Vec<CrawledPackage>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') {
            continue;
        }

        let is_symlink = file_type.is_symlink();
        let is_dir = file_type.is_dir() || (is_symlink && entry.path().is_dir());
        if !is_dir {
            continue;
        }

        let path = entry.path();
        if let Some(scope) = name.strip_prefix('@') {
            walk_scope(&path, scope, seen, out);
        } else {
            process_candidate(&path, None, !is_symlink, seen, out);
        }
    }
}

fn walk_scope(scope_dir: &Path, scope: &str, seen: &mut HashSet<Purl>, out: &mut Vec<CrawledPackage>) {
    let Ok(entries) = fs::read_dir(scope_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let is_symlink = file_type.is_symlink();
        let is_dir = file_type.is_dir() || (is_symlink && entry.path().is_dir());
        if !is_dir {
            continue;
        }
        process_candidate(&entry.path(), Some(scope), !is_symlink, seen, out);
    }
}

fn process_candidate(
    path: &Path,
    scope: Option<&str>,
    is_real_dir: bool,
    seen: &mut HashSet<Purl>,
    out: &mut Vec<CrawledPackage>,
) {
    let Ok(raw) = fs::read_to_string(path.join("package.json")) else {
        return;
    };
    let Ok(package_json) = serde_json::from_str::<PackageJson>(&raw) else {
        return;
    };
    let (Some(name), Some(version)) = (
        package_json.name.as_ref().and_then(|v| v.as_str()),
        package_json.version.as_ref().and_then(|v| v.as_str()),
    ) else {
        return;
    };

    let full_name = match scope {
        Some(scope) => format!("@{scope}/{name}"),
        None => name.to_string(),
    };
    let purl = Purl::new(Ecosystem::Npm, full_name.clone(), version.to_string());

    if !seen.insert(purl.clone()) {
        return;
    }

    out.push(CrawledPackage {
        purl,
        path: path.to_path_buf(),
        name: full_name,
        version: version.to_string(),
        namespace: scope.map(str::to_string),
    });

    // pnpm manages transitive deps elsewhere; never descend through a
    // symlinked candidate into a nested node_modules.
    if is_real_dir {
        let nested = path.join("node_modules");
        if nested.is_dir() {
            walk_node_modules(&nested, seen, out);
        }
    }
}

#[async_trait::async_trait]
impl Crawler for NpmCrawler {
    async fn get_search_roots(&self, options: &CrawlOptions) -> Result<Vec<PathBuf>, CrawlError> {
        let mut roots = Self::local_roots(&options.cwd);
        if options.global {
            roots.extend(Self::global_roots(options.global_prefix.as_deref()).await);
        }
        Ok(roots)
    }

    async fn crawl_all(&self, options: &CrawlOptions) -> Result<Vec<CrawledPackage>, CrawlError> {
        let roots = self.get_search_roots(options).await?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for root in roots {
            walk_node_modules(&root, &mut seen, &mut out);
        }
        Ok(out)
    }

    fn crawl_batches(&self, options: CrawlOptions) -> CrawlBatches {
        let batch_size = options.batch_size;
        let crawler = NpmCrawler::new();
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
        let mut found = HashMap::new();
        for purl in purls {
            if purl.ecosystem() != Ecosystem::Npm {
                continue;
            }
            let (scope, name) = purl.npm_scope_and_name();
            let dir = match scope {
                Some(scope) => root.join(format!("@{scope}")).join(name),
                None => root.join(name),
            };
            let Ok(raw) = fs::read_to_string(dir.join("package.json")) else {
                continue;
            };
            let Ok(package_json) = serde_json::from_str::<PackageJson>(&raw) else {
                continue;
            };
            let Some(installed_version) =
                package_json.version.as_ref().and_then(|v| v.as_str())
            else {
                continue;
            };
            if installed_version != purl.version() {
                continue;
            }
            found.insert(
                purl.clone(),
                CrawledPackage {
                    purl: purl.clone(),
                    path: dir,
                    name: purl.name().to_string(),
                    version: installed_version.to_string(),
                    namespace: scope.map(str::to_string),
                },
            );
        }
        Ok(found)
    }
}
