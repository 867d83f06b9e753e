//! Repository configuration
//!
//! `.grove/config.toml`: the default branch name and a table of named
//! remotes (name -> filesystem path of another store).

use crate::error::{RepoError, Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Branch HEAD points at after `init`.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Named remotes, each a path to another store's working directory.
    #[serde(default)]
    pub remotes: BTreeMap<String, PathBuf>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_branch: default_branch(),
            remotes: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load from the repository directory; a missing file yields defaults.
    pub fn load(repo_dir: &Path) -> Result<Self> {
        let path = repo_dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path).map_err(StoreError::Io)?;
        toml::from_str(&content)
            .map_err(|e| RepoError::Config(format!("failed to parse {CONFIG_FILE}: {e}")))
    }

    pub fn save(&self, repo_dir: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RepoError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(repo_dir.join(CONFIG_FILE), content).map_err(StoreError::Io)?;
        Ok(())
    }

    /// Resolve a remote name to its configured path.
    pub fn remote_path(&self, name: &str) -> Option<&PathBuf> {
        self.remotes.get(name)
    }

    pub fn set_remote(&mut self, name: String, path: PathBuf) {
        self.remotes.insert(name, path);
    }
}
