//! Working tree
//!
//! Reads and writes the files of a working directory: staging paths into
//! the index, snapshotting the on-disk state, and materializing a staged
//! mapping back onto disk. The repository directory itself (and anything
//! under it) is always ignored.

use crate::error::{Result, StoreError};
use crate::index::Index;
use crate::store::ObjectStore;
use crate::types::{ObjectKind, Oid};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// True for paths that version control must never touch.
pub fn is_ignored(relative: &Path, repo_dirname: &str) -> bool {
    relative
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == OsStr::new(repo_dirname)))
}

/// Repo-relative path string with `/` separators.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Stage files into the index, hashing their contents into the store.
///
/// Each path may be a file or a directory; directories are walked
/// recursively with ignore rules applied.
#[instrument(skip(store, index, paths), fields(root = %root.display()))]
pub fn add_paths<P: AsRef<Path>>(
    store: &ObjectStore,
    index: &mut Index,
    root: &Path,
    repo_dirname: &str,
    paths: impl IntoIterator<Item = P>,
) -> Result<()> {
    for path in paths {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        if absolute.is_file() {
            add_file(store, index, root, repo_dirname, &absolute)?;
        } else if absolute.is_dir() {
            for entry in WalkDir::new(&absolute).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    StoreError::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "worktree walk failed")
                    }))
                })?;
                if entry.file_type().is_file() {
                    add_file(store, index, root, repo_dirname, entry.path())?;
                }
            }
        } else {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file or directory: {}", absolute.display()),
            ))
            .into());
        }
    }
    Ok(())
}

fn add_file(
    store: &ObjectStore,
    index: &mut Index,
    root: &Path,
    repo_dirname: &str,
    path: &Path,
) -> Result<()> {
    let Some(name) = relative_name(root, path) else {
        return Ok(());
    };
    if is_ignored(Path::new(&name), repo_dirname) {
        return Ok(());
    }
    let content = fs::read(path).map_err(StoreError::Io)?;
    let oid = store.hash_object(&content, ObjectKind::Blob)?;
    debug!(path = %name, oid = %oid, "Staged file");
    index.insert(name, oid);
    Ok(())
}

/// Hash every non-ignored file under `root` into the store and return
/// the resulting `path -> id` mapping.
pub fn snapshot(store: &ObjectStore, root: &Path, repo_dirname: &str) -> Result<BTreeMap<String, Oid>> {
    let mut mapping = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            StoreError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "worktree walk failed")
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = relative_name(root, entry.path()) else {
            continue;
        };
        if is_ignored(Path::new(&name), repo_dirname) {
            continue;
        }
        let content = fs::read(entry.path()).map_err(StoreError::Io)?;
        let oid = store.hash_object(&content, ObjectKind::Blob)?;
        mapping.insert(name, oid);
    }
    Ok(mapping)
}

/// Replace the working directory's contents with `mapping`.
///
/// Removes every non-ignored file first, then writes each blob, creating
/// parent directories as needed. Empty directories left behind by the
/// sweep are not pruned.
#[instrument(skip(store, mapping), fields(root = %root.display(), entries = mapping.len()))]
pub fn materialize(
    store: &ObjectStore,
    root: &Path,
    repo_dirname: &str,
    mapping: &BTreeMap<String, Oid>,
) -> Result<()> {
    clear_working(root, repo_dirname)?;
    for (name, oid) in mapping {
        let target = root.join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let content = store.get_object(oid, Some(ObjectKind::Blob))?;
        fs::write(&target, content).map_err(StoreError::Io)?;
    }
    Ok(())
}

fn clear_working(root: &Path, repo_dirname: &str) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            StoreError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "worktree walk failed")
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = relative_name(root, entry.path()) else {
            continue;
        };
        if is_ignored(Path::new(&name), repo_dirname) {
            continue;
        }
        fs::remove_file(entry.path()).map_err(StoreError::Io)?;
    }
    Ok(())
}
