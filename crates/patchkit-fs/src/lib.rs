//! Filesystem primitives shared by the blob store and the patch engine.
//!
//! Writes go through a write-temp-then-rename dance so a reader never
//! observes a partially written file, following the same idiom the teacher
//! uses when installing wheel files (`fs::rename(&path, &target)` after
//! writing into a scratch location).

use std::io;
use std::path::{Path, PathBuf};

use fs_err as fs;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("i/o error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("refusing to write through symlink escaping {root}: {target}")]
    SymlinkEscape { root: PathBuf, target: PathBuf },
}

/// Write `content` to `path` atomically: write into a sibling temp file in
/// the same directory (so the rename is same-filesystem), then rename over
/// `path`.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), FsError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|source| FsError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| FsError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    {
        use std::io::Write;
        tmp.write_all(content).map_err(|source| FsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tmp.flush().map_err(|source| FsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    tmp.persist(path).map_err(|err| FsError::Io {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

/// Strip a leading `package/` path segment, as carried by npm tarball-style
/// `FileEntry` paths. Other leading segments are left untouched.
pub fn strip_package_prefix(path: &str) -> &str {
    path.strip_prefix("package/").unwrap_or(path)
}

/// Join `relative` onto `root` after stripping a leading `package/` segment,
/// refusing to resolve through a symlink that escapes `root`.
///
/// This is defense-in-depth, not a hard guarantee: the check re-canonicalizes
/// `root` and the resolved parent directory and compares them with
/// [`same_file::is_same_file`], closing the most common escape vector
/// (a symlinked directory component) without attempting to fully emulate the
/// kernel's path resolution.
pub fn resolve_target(root: &Path, relative: &str) -> Result<PathBuf, FsError> {
    let relative = strip_package_prefix(relative);
    let joined = root.join(relative);

    let Some(parent) = joined.parent() else {
        return Ok(joined);
    };

    if !parent.exists() {
        // Nothing to escape through yet; the caller will create it (or fail)
        // on write.
        return Ok(joined);
    }

    let canonical_root = fs::canonicalize(root).map_err(|source| FsError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let canonical_parent = fs::canonicalize(parent).map_err(|source| FsError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    if !is_within(&canonical_root, &canonical_parent) {
        return Err(FsError::SymlinkEscape {
            root: canonical_root,
            target: canonical_parent,
        });
    }

    Ok(joined)
}

/// `true` if `candidate` is `root` or a descendant of it. Walks `candidate`'s
/// ancestors comparing each to `root` with [`same_file::is_same_file`] rather
/// than a string/component comparison, so it agrees with the filesystem about
/// identity (hard links, bind mounts) instead of just path spelling.
fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate
        .ancestors()
        .any(|ancestor| same_file::is_same_file(root, ancestor).unwrap_or(false))
}
