//! Ref store
//!
//! Mutable named pointers, one file per ref under the repository
//! directory. A ref file holds either a bare 40-hex object id (direct)
//! or `ref: <name>` (symbolic). `HEAD` and `MERGE_HEAD` live at the
//! repository root; everything else lives under `refs/`.

use crate::error::{RepoError, Result, StoreError};
use crate::types::{Oid, RefValue};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

pub const HEAD: &str = "HEAD";
pub const MERGE_HEAD: &str = "MERGE_HEAD";
pub const REFS_DIR: &str = "refs";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
pub const REMOTE_PREFIX: &str = "refs/remote/";

/// Alias names that resolve to HEAD.
pub const HEAD_ALIASES: &[&str] = &["@"];

const SYMBOLIC_PREFIX: &str = "ref: ";

/// Symbolic chains longer than this are assumed cyclic.
const MAX_SYMREF_DEPTH: usize = 32;

/// Handle to one store's ref namespace.
#[derive(Debug, Clone)]
pub struct RefStore {
    root: PathBuf,
}

impl RefStore {
    /// Create a handle rooted at the repository directory. Does not touch disk.
    pub fn new(repo_dir: &Path) -> Self {
        RefStore {
            root: repo_dir.to_path_buf(),
        }
    }

    fn ref_path(&self, name: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in name.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(RepoError::ContractViolation(format!(
                    "invalid ref name {name:?}"
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Read one ref file without following symbolic indirection.
    fn read_single(&self, name: &str) -> Result<RefValue> {
        let path = self.ref_path(name)?;
        if !path.is_file() {
            return Ok(RefValue::Absent);
        }
        let content = fs::read_to_string(&path).map_err(StoreError::Io)?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(RefValue::Absent);
        }
        if let Some(target) = content.strip_prefix(SYMBOLIC_PREFIX) {
            return Ok(RefValue::Symbolic(target.trim().to_string()));
        }
        let oid = Oid::from_hex(content).ok_or_else(|| {
            StoreError::Malformed(format!("ref {name} does not hold a valid object id"))
        })?;
        Ok(RefValue::Direct(oid))
    }

    /// Follow symbolic indirection from `name`, returning the final ref
    /// name and its single-level value.
    ///
    /// With `deref` false the chain is not followed at all. Chains deeper
    /// than the cap are treated as cyclic.
    fn resolve(&self, name: &str, deref: bool) -> Result<(String, RefValue)> {
        let mut current = name.to_string();
        for _ in 0..MAX_SYMREF_DEPTH {
            let value = self.read_single(&current)?;
            match value {
                RefValue::Symbolic(target) if deref => current = target,
                other => return Ok((current, other)),
            }
        }
        Err(RepoError::ContractViolation(format!(
            "symbolic ref chain starting at {name} exceeds {MAX_SYMREF_DEPTH} links"
        )))
    }

    /// Write `value` to `name`, or to the ref `name` ultimately points at
    /// when `deref` is true.
    ///
    /// Writing an absent/empty value is a contract violation, never a
    /// normal failure.
    pub fn update_ref(&self, name: &str, value: &RefValue, deref: bool) -> Result<()> {
        let (target, _) = self.resolve(name, deref)?;
        let text = match value {
            RefValue::Absent => {
                return Err(RepoError::ContractViolation(format!(
                    "refusing to write empty value to ref {target}"
                )))
            }
            RefValue::Symbolic(dest) if dest.trim().is_empty() => {
                return Err(RepoError::ContractViolation(format!(
                    "refusing to write empty symbolic target to ref {target}"
                )))
            }
            RefValue::Direct(oid) => oid.to_hex(),
            RefValue::Symbolic(dest) => format!("{SYMBOLIC_PREFIX}{dest}"),
        };

        let path = self.ref_path(&target)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        fs::write(&path, text).map_err(StoreError::Io)?;
        trace!(ref_name = %target, "Updated ref");
        Ok(())
    }

    /// Resolve `name` to its value, following symbolic chains when
    /// `deref` is true.
    pub fn get_ref(&self, name: &str, deref: bool) -> Result<RefValue> {
        Ok(self.resolve(name, deref)?.1)
    }

    /// Delete `name` (or, with `deref`, the ref it resolves to).
    pub fn delete_ref(&self, name: &str, deref: bool) -> Result<()> {
        let (target, _) = self.resolve(name, deref)?;
        let path = self.ref_path(&target)?;
        if !path.is_file() {
            return Err(StoreError::RefNotFound(target).into());
        }
        fs::remove_file(&path).map_err(StoreError::Io)?;
        trace!(ref_name = %target, "Deleted ref");
        Ok(())
    }

    /// Enumerate refs whose name starts with `prefix`, yielding only
    /// those with a non-empty resolved value.
    ///
    /// `HEAD` and `MERGE_HEAD` are always candidates alongside the
    /// `refs/` walk; the prefix filter applies to them like any other
    /// name.
    pub fn iter_refs(&self, prefix: &str, deref: bool) -> Result<Vec<(String, RefValue)>> {
        let mut names = vec![HEAD.to_string(), MERGE_HEAD.to_string()];

        let refs_root = self.root.join(REFS_DIR);
        if refs_root.is_dir() {
            for entry in WalkDir::new(&refs_root).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    StoreError::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "refs walk failed")
                    }))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&self.root)
                    .expect("walked entry is under the refs root");
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }

        let mut refs = Vec::new();
        for name in names {
            if !prefix.is_empty() && !name.starts_with(prefix) {
                continue;
            }
            let value = self.get_ref(&name, deref)?;
            if value.is_absent() {
                continue;
            }
            refs.push((name, value));
        }
        Ok(refs)
    }
}
