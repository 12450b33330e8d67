//! PathCatalog: registered backups and where they live
//!
//! The catalog maps a normalized [`BackupName`] to its [`BackupRecord`] and is
//! persisted as a single JSON document, rewritten wholesale after every
//! mutation:
//!
//! ```json
//! {
//!   "version": 1,
//!   "backups": {
//!     "zelda": {
//!       "name": "zelda",
//!       "display_name": "Zelda",
//!       "source_path": "/home/me/saves/zelda",
//!       "backup_root": "/backups/zelda",
//!       "created_at": "2026-10-18T12:00:00Z",
//!       "last_updated_at": "2026-10-18T12:00:00Z"
//!     }
//!   }
//! }
//! ```
//!
//! `backup_root` is written for human readers but always re-derived from the
//! root directory on load. There is no cross-process locking: the last
//! writer wins.

use crate::error::{Result, SaveSyncError};
use crate::name::BackupName;
use crate::types::BackupRecord;
use crate::utils;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Current catalog format version
const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    backups: BTreeMap<String, BackupRecord>,
}

/// Registry of backups, persisted on every mutation
#[derive(Debug)]
pub struct PathCatalog {
    /// File the catalog is persisted to
    path: PathBuf,
    /// Directory every backup root lives under
    root_backup_dir: PathBuf,
    /// Records keyed by normalized name
    records: BTreeMap<String, BackupRecord>,
}

impl PathCatalog {
    /// Open the catalog stored at `path`
    ///
    /// A missing file is an empty catalog. A file that cannot be read or parsed
    /// is a fatal [`SaveSyncError::Config`]; there is no automatic repair.
    pub fn open(path: impl Into<PathBuf>, root_backup_dir: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let root_backup_dir = root_backup_dir.into();

        let records = match fs::read_to_string(&path) {
            Ok(content) => Self::decode(&content, &path, &root_backup_dir)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No catalog at {:?}, starting empty", path);
                BTreeMap::new()
            }
            Err(e) => {
                return Err(SaveSyncError::config(format!(
                    "cannot read catalog {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            root_backup_dir,
            records,
        })
    }

    fn decode(
        content: &str,
        path: &Path,
        root_backup_dir: &Path,
    ) -> Result<BTreeMap<String, BackupRecord>> {
        let file: CatalogFile = serde_json::from_str(content).map_err(|e| {
            SaveSyncError::config(format!("catalog {} is corrupt: {}", path.display(), e))
        })?;
        if file.version > CATALOG_VERSION {
            return Err(SaveSyncError::config(format!(
                "catalog {} has unsupported version {}",
                path.display(),
                file.version
            )));
        }

        let mut records = BTreeMap::new();
        for (key, mut record) in file.backups {
            let normalized = BackupName::normalize(&key).map_err(|e| {
                SaveSyncError::config(format!("catalog entry {:?} is invalid: {}", key, e))
            })?;
            if normalized != record.name {
                return Err(SaveSyncError::config(format!(
                    "catalog entry {:?} does not match its record name {:?}",
                    key, record.name
                )));
            }
            let derived = root_backup_dir.join(&normalized);
            if record.backup_root != derived {
                debug!(
                    "Re-deriving backup root for {}: {:?} -> {:?}",
                    normalized, record.backup_root, derived
                );
                record.backup_root = derived;
            }
            records.insert(normalized, record);
        }
        Ok(records)
    }

    /// Persist `records` as the whole catalog, then adopt them
    ///
    /// In-memory state only changes once the file is written, so a failed
    /// write leaves the catalog as it was.
    fn commit(&mut self, records: BTreeMap<String, BackupRecord>) -> Result<()> {
        let file = CatalogFile {
            version: CATALOG_VERSION,
            backups: records,
        };
        let json = serde_json::to_string_pretty(&file)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        utils::atomic_write(&self.path, json.as_bytes())?;
        self.records = file.backups;
        debug!("Persisted catalog with {} entries", self.records.len());
        Ok(())
    }

    /// Copy of the records with `key` changed by `edit`
    fn edited(
        &self,
        key: &str,
        edit: impl FnOnce(&mut BackupRecord),
    ) -> Result<(BTreeMap<String, BackupRecord>, BackupRecord)> {
        let mut records = self.records.clone();
        let record = records
            .get_mut(key)
            .ok_or_else(|| SaveSyncError::NotFound(key.to_string()))?;
        edit(record);
        let updated = record.clone();
        Ok((records, updated))
    }

    /// File the catalog is persisted to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a backup by name (any spelling)
    pub fn resolve(&self, name: &str) -> Result<&BackupRecord> {
        let normalized = BackupName::normalize(name)?;
        self.records
            .get(&normalized)
            .ok_or(SaveSyncError::NotFound(normalized))
    }

    /// Whether a backup is registered under this name
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Register a new backup
    ///
    /// # Errors
    ///
    /// - [`SaveSyncError::InvalidName`] if the name is empty or has forbidden characters
    /// - [`SaveSyncError::DuplicateName`] if the normalized name is taken
    /// - [`SaveSyncError::SourceNotFound`] if `source_path` does not exist
    #[instrument(skip(self))]
    pub fn register(&mut self, name: &str, source_path: &Path) -> Result<BackupRecord> {
        let name = BackupName::parse(name)?;
        if self.records.contains_key(name.as_str()) {
            return Err(SaveSyncError::DuplicateName(name.as_str().to_string()));
        }

        let source_path = utils::clean_user_path(source_path)?;
        if !source_path.exists() {
            return Err(SaveSyncError::SourceNotFound(source_path));
        }

        let now = Utc::now();
        let record = BackupRecord {
            name: name.as_str().to_string(),
            display_name: name.display_name().to_string(),
            source_path,
            backup_root: self.root_backup_dir.join(name.as_str()),
            created_at: now,
            last_updated_at: now,
        };

        let mut records = self.records.clone();
        records.insert(record.name.clone(), record.clone());
        self.commit(records)?;
        info!("Registered backup {}", record.name);
        Ok(record)
    }

    /// Remove a record; files on disk are left alone
    #[instrument(skip(self))]
    pub fn unregister(&mut self, name: &str) -> Result<BackupRecord> {
        let normalized = BackupName::normalize(name)?;
        let mut records = self.records.clone();
        let record = records
            .remove(&normalized)
            .ok_or_else(|| SaveSyncError::NotFound(normalized.clone()))?;
        self.commit(records)?;
        info!("Unregistered backup {}", normalized);
        Ok(record)
    }

    /// Replace a backup's source path (interactive override)
    pub fn set_source_path(&mut self, name: &str, source_path: &Path) -> Result<BackupRecord> {
        let source_path = utils::clean_user_path(source_path)?;
        let normalized = BackupName::normalize(name)?;
        let (records, updated) =
            self.edited(&normalized, |record| record.source_path = source_path)?;
        self.commit(records)?;
        Ok(updated)
    }

    /// Stamp `last_updated_at` with the current time
    pub fn touch(&mut self, name: &str) -> Result<BackupRecord> {
        let normalized = BackupName::normalize(name)?;
        let (records, updated) =
            self.edited(&normalized, |record| record.last_updated_at = Utc::now())?;
        self.commit(records)?;
        Ok(updated)
    }

    /// All records sorted by name
    pub fn list(&self) -> Vec<BackupRecord> {
        self.records.values().cloned().collect()
    }

    /// All normalized names, sorted
    pub fn names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    /// Number of registered backups
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no backup is registered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write a copy of the catalog to another file
    pub fn export_to(&self, path: &Path) -> Result<usize> {
        let file = CatalogFile {
            version: CATALOG_VERSION,
            backups: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        utils::atomic_write(path, json.as_bytes())?;
        info!("Exported {} catalog entries to {:?}", self.records.len(), path);
        Ok(self.records.len())
    }

    /// Replace the catalog with the contents of an exported file
    ///
    /// Every record is validated before anything is replaced; backup roots are
    /// re-derived for this catalog's root directory.
    pub fn import_from(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path).map_err(|e| {
            SaveSyncError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let records = Self::decode(&content, path, &self.root_backup_dir)?;
        for record in records.values() {
            if !record.source_path.exists() {
                warn!(
                    "Imported backup {} points at missing source {:?}",
                    record.name, record.source_path
                );
            }
        }
        self.commit(records)?;
        info!("Imported {} catalog entries from {:?}", self.records.len(), path);
        Ok(self.records.len())
    }
}
