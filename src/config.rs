//! Root configuration
//!
//! [`SaveSyncConfig`] is the single place where the on-disk layout is decided.
//! It is passed explicitly into the catalog and the ledger, so several
//! independent instances (for example one per test) can coexist in one
//! process.
//!
//! ## Layout
//!
//! ```text
//! <root_backup_dir>/
//!   catalog.json
//!   <name>/                      backup tree + metadata file
//!   logs/
//!     backup_log.txt             audit log
//!     safety_backups/<subject>_<op>_<timestamp>/
//! ```

use crate::error::{Result, SaveSyncError};
use crate::utils;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Characters encoded in a search word: everything but RFC 3986 unreserved
const QUERY_WORD_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Default name of the per-backup metadata file
pub const DEFAULT_METADATA_FILE: &str = "README.txt";

/// Default site used to look up save locations
pub const DEFAULT_SEARCH_URL: &str = "https://savegame.pro/";

/// Default name of the top-level remote container
pub const DEFAULT_REMOTE_CONTAINER: &str = "SaveSync Backups";

/// Typed configuration for a backup root
///
/// # Examples
///
/// ```rust
/// use savesync::SaveSyncConfig;
///
/// let config = SaveSyncConfig::new("/backups");
/// assert!(config.safety_root().ends_with("logs/safety_backups"));
/// assert!(config.excluded_names().contains("README.txt"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveSyncConfig {
    /// Directory holding every backup instance
    pub root_backup_dir: PathBuf,
    /// Name of the metadata file written into each backup
    #[serde(default = "default_metadata_file_name")]
    pub metadata_file_name: String,
    /// Additional filenames the mirror must never touch
    #[serde(default)]
    pub extra_excluded_names: Vec<String>,
    /// Base URL for save-location searches
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// Top-level container name on remote stores
    #[serde(default = "default_remote_container")]
    pub remote_container: String,
}

fn default_metadata_file_name() -> String {
    DEFAULT_METADATA_FILE.to_string()
}

fn default_search_url() -> String {
    DEFAULT_SEARCH_URL.to_string()
}

fn default_remote_container() -> String {
    DEFAULT_REMOTE_CONTAINER.to_string()
}

impl SaveSyncConfig {
    /// Configuration with defaults for everything but the root
    pub fn new(root_backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_backup_dir: root_backup_dir.into(),
            metadata_file_name: default_metadata_file_name(),
            extra_excluded_names: Vec::new(),
            search_url: default_search_url(),
            remote_container: default_remote_container(),
        }
    }

    /// Load configuration from a JSON file
    ///
    /// A missing or unparsable file is a [`SaveSyncError::Config`]: the tool
    /// cannot pick a backup root on its own.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SaveSyncError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            SaveSyncError::config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Write configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        utils::atomic_write(path, json.as_bytes())
    }

    /// Reject configurations that would break the layout
    pub fn validate(&self) -> Result<()> {
        if self.root_backup_dir.as_os_str().is_empty() {
            return Err(SaveSyncError::config("root_backup_dir is empty"));
        }
        let meta = self.metadata_file_name.trim();
        if meta.is_empty() || meta.contains(['/', '\\']) {
            return Err(SaveSyncError::config(format!(
                "metadata_file_name {:?} must be a plain file name",
                self.metadata_file_name
            )));
        }
        Ok(())
    }

    /// Same configuration pointed at another root directory
    pub fn with_root(&self, root_backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_backup_dir: root_backup_dir.into(),
            ..self.clone()
        }
    }

    /// `root/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.root_backup_dir.join("logs")
    }

    /// `root/logs/safety_backups`
    pub fn safety_root(&self) -> PathBuf {
        self.logs_dir().join("safety_backups")
    }

    /// `root/logs/backup_log.txt`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("backup_log.txt")
    }

    /// `root/catalog.json`
    pub fn catalog_path(&self) -> PathBuf {
        self.root_backup_dir.join("catalog.json")
    }

    /// Backup directory for a normalized name
    pub fn backup_root_for(&self, normalized_name: &str) -> PathBuf {
        self.root_backup_dir.join(normalized_name)
    }

    /// Filenames excluded from mirror diffing
    pub fn excluded_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .extra_excluded_names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        names.insert(self.metadata_file_name.clone());
        names
    }

    /// Create root, logs and safety directories
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.root_backup_dir.clone(), self.logs_dir(), self.safety_root()] {
            fs::create_dir_all(&dir).map_err(|e| {
                SaveSyncError::config(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// URL searching the configured site for a game's save location
    ///
    /// Words are joined with `+`; everything else outside the unreserved
    /// set is percent-encoded.
    pub fn save_search_url(&self, title: &str) -> String {
        let query: Vec<String> = title
            .split_whitespace()
            .map(|word| utf8_percent_encode(word, QUERY_WORD_ENCODE_SET).to_string())
            .collect();
        format!("{}?s={}", self.search_url, query.join("+"))
    }
}
