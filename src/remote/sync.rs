use super::{RemoteArchiveTransfer, RemoteEntry, RemoteId, RemoteKind};
use crate::archive::{self, ArchiveStats, ARCHIVE_EXTENSION};
use crate::error::{Result, SaveSyncError};
use crate::event_log::{LogAction, LogEvent};
use crate::ledger::BackupLedger;
use crate::name::BackupName;
use crate::types::{RestoreOptions, RestoreReport};
use crate::utils;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// Name of each remote backup folder
const FOLDER_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const MANIFEST_FILE: &str = "manifest.json";

/// Description uploaded next to every archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteManifest {
    pub name: String,
    pub display_name: String,
    pub source_path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Machine the backup was pushed from
    pub host: String,
    /// Hex SHA-256 of the archive file
    pub archive_sha256: String,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// One remote backup of a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBackup {
    pub id: RemoteId,
    /// Timestamped folder name
    pub folder: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a push
#[derive(Debug, Clone)]
pub struct PushReport {
    pub folder: String,
    pub manifest: RemoteManifest,
    pub stats: ArchiveStats,
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Uploaded {} as {} ({} files, {})",
            self.manifest.display_name,
            self.folder,
            self.manifest.file_count,
            utils::format_bytes(self.stats.archive_bytes)
        )
    }
}

/// Result of a pull
#[derive(Debug, Clone)]
pub struct PullReport {
    pub folder: String,
    pub manifest: Option<RemoteManifest>,
    pub restore: RestoreReport,
}

impl fmt::Display for PullReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "From remote {}: {}", self.folder, self.restore)
    }
}

/// Cloud backup and restore on top of a blob store
///
/// ```rust,no_run
/// use savesync::remote::{MemoryBlobStore, RemoteBackups};
/// use savesync::{BackupLedger, RestoreOptions, SaveSyncConfig};
///
/// # fn main() -> savesync::Result<()> {
/// let ledger = BackupLedger::open(SaveSyncConfig::new("/backups"))?;
/// let remote = RemoteBackups::new(MemoryBlobStore::new(), "SaveSync Backups");
///
/// remote.push(&ledger, "zelda")?;
/// remote.pull(&ledger, "zelda", None, &RestoreOptions::auto())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RemoteBackups<S> {
    store: S,
    container: String,
}

impl<S: RemoteArchiveTransfer> RemoteBackups<S> {
    pub fn new(store: S, container: impl Into<String>) -> Self {
        Self {
            store,
            container: container.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Folder holding every remote backup of `name`, if any exists
    fn find_name_folder(&self, name: &str) -> Result<Option<RemoteId>> {
        let container = self.store.find_or_create_container(&self.container)?;
        Ok(self
            .store
            .list_children(&container)?
            .into_iter()
            .find(|entry| entry.is_folder() && entry.name == name)
            .map(|entry| entry.id))
    }

    /// Archive the live save folder of `name` and upload it
    #[instrument(skip(self, ledger))]
    pub fn push(&self, ledger: &BackupLedger, name: &str) -> Result<PushReport> {
        let record = ledger.record(name)?;
        let (source, _) = ledger.resolve_live_path(&record, true, None)?;
        utils::require_dir(&source)?;

        let staging = TempDir::new()?;
        let archive_path = staging
            .path()
            .join(format!("{}.{}", record.name, ARCHIVE_EXTENSION));
        let stats = archive::pack_directory(&source, &archive_path)?;

        let manifest = RemoteManifest {
            name: record.name.clone(),
            display_name: record.display_name.clone(),
            source_path: source.clone(),
            created_at: Utc::now(),
            host: hostname::get()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            archive_sha256: archive::sha256_file(&archive_path)?,
            file_count: stats.files,
            total_bytes: stats.total_bytes,
        };
        let manifest_path = staging.path().join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;

        let folder = Local::now().format(FOLDER_TIME_FORMAT).to_string();
        let container = self.store.find_or_create_container(&self.container)?;
        let name_folder = self.store.create_subfolder(&container, &record.name)?;
        let backup_folder = self.store.create_subfolder(&name_folder, &folder)?;
        self.store.upload_archive(&backup_folder, &archive_path)?;
        self.store.upload_archive(&backup_folder, &manifest_path)?;

        ledger.log_event(LogEvent::new(LogAction::RemoteUpload, &record.name, source.display()));
        info!("Pushed {} to remote folder {}", record.name, folder);
        Ok(PushReport {
            folder,
            manifest,
            stats,
        })
    }

    /// Remote backups of `name`, newest first
    pub fn list(&self, name: &str) -> Result<Vec<RemoteBackup>> {
        let name = BackupName::normalize(name)?;
        let Some(name_folder) = self.find_name_folder(&name)? else {
            return Ok(Vec::new());
        };
        let mut backups: Vec<RemoteBackup> = self
            .store
            .list_children(&name_folder)?
            .into_iter()
            .filter(RemoteEntry::is_folder)
            .map(|entry| RemoteBackup {
                id: entry.id,
                folder: entry.name,
                created_at: entry.created_at,
            })
            .collect();
        // Folder names are timestamps, so they sort chronologically
        backups.sort_by(|a, b| b.folder.cmp(&a.folder));
        Ok(backups)
    }

    fn pick(&self, name: &str, folder: Option<&str>) -> Result<RemoteBackup> {
        let backups = self.list(name)?;
        let picked = match folder {
            Some(wanted) => backups.into_iter().find(|b| b.folder == wanted),
            None => backups.into_iter().next(),
        };
        picked.ok_or_else(|| {
            SaveSyncError::remote(format!(
                "no remote backup {} for {}",
                folder.unwrap_or("(latest)"),
                name
            ))
        })
    }

    /// Download a remote backup and restore it like a local one
    ///
    /// Uses the newest remote backup unless `folder` names one. The archive
    /// is checked against the manifest checksum before anything is touched.
    #[instrument(skip(self, ledger, options))]
    pub fn pull(
        &self,
        ledger: &BackupLedger,
        name: &str,
        folder: Option<&str>,
        options: &RestoreOptions,
    ) -> Result<PullReport> {
        let record = ledger.record(name)?;
        let backup = self.pick(&record.name, folder)?;
        let children = self.store.list_children(&backup.id)?;

        let archive_entry = children
            .iter()
            .find(|c| c.kind == RemoteKind::File && c.name.ends_with(&format!(".{}", ARCHIVE_EXTENSION)))
            .ok_or_else(|| {
                SaveSyncError::remote(format!("remote folder {} has no archive", backup.folder))
            })?;

        let manifest = match children.iter().find(|c| c.name == MANIFEST_FILE) {
            Some(entry) => {
                let bytes = self.store.download(&entry.id)?;
                Some(serde_json::from_slice::<RemoteManifest>(&bytes)?)
            }
            None => {
                warn!("Remote folder {} has no manifest, skipping checksum", backup.folder);
                None
            }
        };

        let bytes = self.store.download(&archive_entry.id)?;
        if let Some(manifest) = &manifest {
            let actual = archive::sha256_bytes(&bytes);
            if actual != manifest.archive_sha256 {
                return Err(SaveSyncError::archive(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    archive_entry.name, manifest.archive_sha256, actual
                )));
            }
        }

        let staging = TempDir::new()?;
        let tree = staging.path().join("tree");
        let unpacked = archive::unpack_archive(&bytes, &tree)?;
        debug!("Unpacked {} files from {}", unpacked.files, backup.folder);

        let (destination, _) = ledger.resolve_live_path(
            &record,
            options.auto_confirm,
            options.destination_override.as_ref(),
        )?;
        let (snapshot, stats) = ledger.restore_tree(
            &record,
            &tree,
            &destination,
            options.auto_confirm,
            options.snapshot_policy,
        )?;
        ledger.log_event(LogEvent::new(
            LogAction::RemoteRestore,
            &record.name,
            destination.display(),
        ));

        info!("Restored {} from remote folder {}", record.name, backup.folder);
        Ok(PullReport {
            folder: backup.folder,
            manifest,
            restore: RestoreReport {
                record,
                destination,
                snapshot,
                stats,
            },
        })
    }

    /// Remove one remote backup of `name`
    #[instrument(skip(self, ledger))]
    pub fn delete(&self, ledger: &BackupLedger, name: &str, folder: &str) -> Result<()> {
        let normalized = BackupName::normalize(name)?;
        let backup = self.pick(&normalized, Some(folder))?;
        self.store.delete(&backup.id)?;
        ledger.log_event(LogEvent::new(
            LogAction::RemoteDelete,
            &normalized,
            format!("{}/{}/{}", self.container, normalized, backup.folder),
        ));
        info!("Deleted remote backup {} of {}", backup.folder, normalized);
        Ok(())
    }
}
