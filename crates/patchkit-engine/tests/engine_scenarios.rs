//! The six literal end-to-end scenarios from the patch engine spec,
//! exercised against the real npm/pypi crawlers over throwaway
//! directory trees.

use indexmap::IndexMap;
use patchkit_crawl::npm::NpmCrawler;
use patchkit_crawl::pypi::PypiCrawler;
use patchkit_crawl::CrawlOptions;
use patchkit_engine::driver::PackageOutcomeKind;
use patchkit_engine::{Engine, EngineError, EngineOptions};
use patchkit_fetch::NullFetcher;
use patchkit_hash::hash_bytes;
use patchkit_manifest::{FileEntry, Manifest, PatchRecord, Tier};
use patchkit_store::BlobStore;
use uuid::Uuid;

fn patch_record(files: IndexMap<String, FileEntry>) -> PatchRecord {
    PatchRecord {
        uuid: Uuid::new_v4(),
        exported_at: jiff::Timestamp::from_second(0).unwrap(),
        files,
        vulnerabilities: IndexMap::new(),
        description: String::new(),
        license: String::new(),
        tier: Tier::Free,
        extra: serde_json::Map::new(),
    }
}

fn write_npm_package(cwd: &std::path::Path, name: &str, version: &str, content: &[u8]) {
    let pkg_dir = cwd.join("node_modules").join(name);
    std::fs::create_dir_all(&pkg_dir).unwrap();
    std::fs::write(
        pkg_dir.join("package.json"),
        serde_json::json!({ "name": name, "version": version }).to_string(),
    )
    .unwrap();
    std::fs::write(pkg_dir.join("index.js"), content).unwrap();
}

fn write_pypi_package(site_packages: &std::path::Path, name: &str, version: &str, content: &[u8]) {
    let dist_info = site_packages.join(format!("{name}-{version}.dist-info"));
    std::fs::create_dir_all(&dist_info).unwrap();
    std::fs::write(
        dist_info.join("METADATA"),
        format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n\n"),
    )
    .unwrap();
    std::fs::write(site_packages.join("__init__.py"), content).unwrap();
}

#[tokio::test]
async fn scenario_1_apply_npm_patch_dry_run() {
    let project = tempfile::tempdir().unwrap();
    write_npm_package(project.path(), "test-pkg", "1.0.0", b"console.log(\"original\");");

    let blob_dir = tempfile::tempdir().unwrap();
    let blobs = BlobStore::new(blob_dir.path().to_path_buf());
    let h_before = hash_bytes(b"console.log(\"original\");");
    let h_after = hash_bytes(b"console.log(\"patched\");");
    blobs.put(&h_after, b"console.log(\"patched\");").unwrap();

    let mut files = IndexMap::new();
    files.insert("package/index.js".to_string(), FileEntry::new(h_before, h_after));
    let mut manifest = Manifest::new();
    let purl: patchkit_purl::Purl = "pkg:npm/test-pkg@1.0.0".parse().unwrap();
    manifest.patches.insert(purl.clone(), patch_record(files));

    let npm_crawler = NpmCrawler::new();
    let pypi_crawler = PypiCrawler::new();
    let fetcher = NullFetcher;
    let engine = Engine {
        blobs: &blobs,
        fetcher: &fetcher,
        npm_crawler: &npm_crawler,
        pypi_crawler: &pypi_crawler,
    };

    let crawl_options = CrawlOptions {
        cwd: project.path().to_path_buf(),
        ..Default::default()
    };
    let report = engine
        .apply_all(
            &manifest,
            &crawl_options,
            EngineOptions {
                offline: false,
                dry_run: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 1);
    assert!(report.failed.is_empty());
    match &report.succeeded[0].outcome {
        Ok(PackageOutcomeKind::Applied { files_patched }) => assert!(files_patched.is_empty()),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let content = std::fs::read(
        project
            .path()
            .join("node_modules")
            .join("test-pkg")
            .join("index.js"),
    )
    .unwrap();
    assert_eq!(content, b"console.log(\"original\");");
}

#[tokio::test]
async fn scenario_2_apply_fails_on_tampered_file() {
    let project = tempfile::tempdir().unwrap();
    write_npm_package(project.path(), "test-pkg", "1.0.0", b"user edits");

    let blob_dir = tempfile::tempdir().unwrap();
    let blobs = BlobStore::new(blob_dir.path().to_path_buf());
    let h_before = hash_bytes(b"console.log(\"original\");");
    let h_after = hash_bytes(b"console.log(\"patched\");");
    blobs.put(&h_after, b"console.log(\"patched\");").unwrap();

    let mut files = IndexMap::new();
    files.insert("package/index.js".to_string(), FileEntry::new(h_before, h_after));
    let mut manifest = Manifest::new();
    let purl: patchkit_purl::Purl = "pkg:npm/test-pkg@1.0.0".parse().unwrap();
    manifest.patches.insert(purl, patch_record(files));

    let npm_crawler = NpmCrawler::new();
    let pypi_crawler = PypiCrawler::new();
    let fetcher = NullFetcher;
    let engine = Engine {
        blobs: &blobs,
        fetcher: &fetcher,
        npm_crawler: &npm_crawler,
        pypi_crawler: &pypi_crawler,
    };

    let crawl_options = CrawlOptions {
        cwd: project.path().to_path_buf(),
        ..Default::default()
    };
    let report = engine
        .apply_all(&manifest, &crawl_options, EngineOptions::default())
        .await
        .unwrap();

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].outcome,
        Err(EngineError::HashMismatch { .. })
    ));

    let content = std::fs::read(
        project
            .path()
            .join("node_modules")
            .join("test-pkg")
            .join("index.js"),
    )
    .unwrap();
    assert_eq!(content, b"user edits");
}

#[tokio::test]
async fn scenario_3_rollback_already_original_is_a_noop() {
    let project = tempfile::tempdir().unwrap();
    write_npm_package(project.path(), "test-pkg", "1.0.0", b"console.log(\"original\");");

    let blob_dir = tempfile::tempdir().unwrap();
    let blobs = BlobStore::new(blob_dir.path().to_path_buf());
    let h_before = hash_bytes(b"console.log(\"original\");");
    let h_after = hash_bytes(b"console.log(\"patched\");");
    blobs.put(&h_before, b"console.log(\"original\");").unwrap();

    let mut files = IndexMap::new();
    files.insert("package/index.js".to_string(), FileEntry::new(h_before, h_after));
    let mut manifest = Manifest::new();
    let purl: patchkit_purl::Purl = "pkg:npm/test-pkg@1.0.0".parse().unwrap();
    manifest.patches.insert(purl.clone(), patch_record(files));

    let npm_crawler = NpmCrawler::new();
    let pypi_crawler = PypiCrawler::new();
    let fetcher = NullFetcher;
    let engine = Engine {
        blobs: &blobs,
        fetcher: &fetcher,
        npm_crawler: &npm_crawler,
        pypi_crawler: &pypi_crawler,
    };

    let crawl_options = CrawlOptions {
        cwd: project.path().to_path_buf(),
        ..Default::default()
    };
    let report = engine
        .rollback(&manifest, &crawl_options, Some("pkg:npm/test-pkg@1.0.0"), false)
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 1);
    match &report.succeeded[0].outcome {
        Ok(PackageOutcomeKind::RolledBack { files_rolled_back }) => {
            assert!(files_rolled_back.is_empty());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn scenario_4_pypi_qualifier_fallback_picks_second_variant() {
    let venv = tempfile::tempdir().unwrap();
    let site_packages = venv.path().join("lib").join("python3.11").join("site-packages");
    std::fs::create_dir_all(&site_packages).unwrap();
    write_pypi_package(&site_packages, "requests", "2.28.0", b"variant-b-original");

    std::env::set_var("VIRTUAL_ENV", venv.path());

    let blob_dir = tempfile::tempdir().unwrap();
    let blobs = BlobStore::new(blob_dir.path().to_path_buf());
    let h_a_before = hash_bytes(b"variant-a-original");
    let h_a_after = hash_bytes(b"variant-a-patched");
    let h_b_before = hash_bytes(b"variant-b-original");
    let h_b_after = hash_bytes(b"variant-b-patched");
    blobs.put(&h_a_after, b"variant-a-patched").unwrap();
    blobs.put(&h_b_after, b"variant-b-patched").unwrap();

    let mut files_a = IndexMap::new();
    files_a.insert(
        "package/__init__.py".to_string(),
        FileEntry::new(h_a_before, h_a_after),
    );
    let mut files_b = IndexMap::new();
    files_b.insert(
        "package/__init__.py".to_string(),
        FileEntry::new(h_b_before, h_b_after.clone()),
    );

    let purl_a: patchkit_purl::Purl =
        "pkg:pypi/requests@2.28.0?artifact_id=aaa".parse().unwrap();
    let purl_b: patchkit_purl::Purl =
        "pkg:pypi/requests@2.28.0?artifact_id=bbb".parse().unwrap();

    let mut manifest = Manifest::new();
    manifest.patches.insert(purl_a, patch_record(files_a));
    manifest.patches.insert(purl_b.clone(), patch_record(files_b));

    let npm_crawler = NpmCrawler::new();
    let pypi_crawler = PypiCrawler::new();
    let fetcher = NullFetcher;
    let engine = Engine {
        blobs: &blobs,
        fetcher: &fetcher,
        npm_crawler: &npm_crawler,
        pypi_crawler: &pypi_crawler,
    };

    let crawl_options = CrawlOptions::default();
    let report = engine
        .apply_all(&manifest, &crawl_options, EngineOptions::default())
        .await
        .unwrap();

    std::env::remove_var("VIRTUAL_ENV");

    assert_eq!(report.succeeded.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.succeeded[0].purl, purl_b);

    let content = std::fs::read(site_packages.join("__init__.py")).unwrap();
    assert_eq!(content, b"variant-b-patched");
}

#[tokio::test]
async fn scenario_5_gc_removes_orphan_and_before_blobs_keeps_after_blobs() {
    let blob_dir = tempfile::tempdir().unwrap();
    let blobs = BlobStore::new(blob_dir.path().to_path_buf());

    let h_a1 = hash_bytes(b"after1");
    let h_a2 = hash_bytes(b"after2");
    let h_b1 = hash_bytes(b"before1");
    let h_b2 = hash_bytes(b"before2");
    let h_orphan = hash_bytes(b"orphan");

    for (hash, content) in [
        (&h_a1, &b"after1"[..]),
        (&h_a2, &b"after2"[..]),
        (&h_b1, &b"before1"[..]),
        (&h_b2, &b"before2"[..]),
        (&h_orphan, &b"orphan"[..]),
    ] {
        blobs.put(hash, content).unwrap();
    }

    let mut manifest = Manifest::new();
    let mut files1 = IndexMap::new();
    files1.insert("package/a.js".to_string(), FileEntry::new(h_b1.clone(), h_a1.clone()));
    manifest.patches.insert(
        "pkg:npm/pkg-one@1.0.0".parse().unwrap(),
        patch_record(files1),
    );
    let mut files2 = IndexMap::new();
    files2.insert("package/b.js".to_string(), FileEntry::new(h_b2.clone(), h_a2.clone()));
    manifest.patches.insert(
        "pkg:npm/pkg-two@1.0.0".parse().unwrap(),
        patch_record(files2),
    );

    let report = patchkit_engine::collect_garbage(&manifest, &blobs, false).unwrap();

    assert!(blobs.exists(&h_a1));
    assert!(blobs.exists(&h_a2));
    assert!(!blobs.exists(&h_b1));
    assert!(!blobs.exists(&h_b2));
    assert!(!blobs.exists(&h_orphan));
    assert_eq!(report.deleted.len(), 3);
}

#[tokio::test]
async fn scenario_6_rollback_fails_when_before_blob_absent_and_offline() {
    let project = tempfile::tempdir().unwrap();
    write_npm_package(project.path(), "test-pkg", "1.0.0", b"console.log(\"patched\");");

    let blob_dir = tempfile::tempdir().unwrap();
    let blobs = BlobStore::new(blob_dir.path().to_path_buf());
    let h_before = hash_bytes(b"console.log(\"original\");");
    let h_after = hash_bytes(b"console.log(\"patched\");");
    // Before-blob deliberately absent from the store.

    let mut files = IndexMap::new();
    files.insert("package/index.js".to_string(), FileEntry::new(h_before, h_after));
    let mut manifest = Manifest::new();
    let purl: patchkit_purl::Purl = "pkg:npm/test-pkg@1.0.0".parse().unwrap();
    manifest.patches.insert(purl.clone(), patch_record(files));

    let npm_crawler = NpmCrawler::new();
    let pypi_crawler = PypiCrawler::new();
    let fetcher = NullFetcher;
    let engine = Engine {
        blobs: &blobs,
        fetcher: &fetcher,
        npm_crawler: &npm_crawler,
        pypi_crawler: &pypi_crawler,
    };

    let crawl_options = CrawlOptions {
        cwd: project.path().to_path_buf(),
        ..Default::default()
    };
    let result = engine
        .rollback(&manifest, &crawl_options, Some("pkg:npm/test-pkg@1.0.0"), true)
        .await;

    assert!(matches!(result, Err(EngineError::BlobMissing { .. })));

    let content = std::fs::read(
        project
            .path()
            .join("node_modules")
            .join("test-pkg")
            .join("index.js"),
    )
    .unwrap();
    assert_eq!(content, b"console.log(\"patched\");");
}

