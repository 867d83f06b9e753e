//! Staging index
//!
//! A flat `path -> blob id` mapping persisted between operations as JSON
//! at `.grove/index`. The engine consumes it only at this interface:
//! read, replace wholesale, iterate.

use crate::error::{RepoError, Result, StoreError};
use crate::types::Oid;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "index";

/// The staged snapshot that the next commit will turn into a tree.
#[derive(Debug)]
pub struct Index {
    path: PathBuf,
    entries: BTreeMap<String, Oid>,
}

impl Index {
    /// Load the index from the repository directory.
    ///
    /// A missing file is an empty index, not an error.
    pub fn load(repo_dir: &Path) -> Result<Self> {
        let path = repo_dir.join(INDEX_FILE);
        let entries = if path.is_file() {
            let bytes = fs::read(&path).map_err(StoreError::Io)?;
            serde_json::from_slice(&bytes)
                .map_err(|e| RepoError::Index(format!("failed to parse {INDEX_FILE}: {e}")))?
        } else {
            BTreeMap::new()
        };
        Ok(Index { path, entries })
    }

    /// Persist atomically via temp file + rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let serialized = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| RepoError::Index(format!("failed to serialize index: {e}")))?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &serialized).map_err(StoreError::Io)?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::Io(e)
        })?;
        Ok(())
    }

    pub fn entries(&self) -> &BTreeMap<String, Oid> {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<Oid> {
        self.entries.get(path).copied()
    }

    pub fn insert(&mut self, path: String, oid: Oid) {
        self.entries.insert(path, oid);
    }

    /// Drop the current contents in favor of `mapping`.
    pub fn replace(&mut self, mapping: BTreeMap<String, Oid>) {
        self.entries = mapping;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
