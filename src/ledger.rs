//! BackupLedger: lifecycle of named backups
//!
//! The ledger ties the other components together. Each named backup moves
//! through `UNREGISTERED -> ACTIVE -> DELETED`:
//!
//! | Operation | Snapshot taken of | Tree operation |
//! |-----------|-------------------|----------------|
//! | `create`  | nothing           | full recursive copy into a fresh backup root |
//! | `update`  | the backup tree   | mirror source -> backup root |
//! | `restore` | the live folder   | copy-and-replace backup root -> live folder |
//! | `delete`  | nothing           | remove backup root and its snapshots |
//!
//! Update mirrors (orphaned backup files are deleted) while restore only
//! copies and replaces (unrelated files in the live folder survive). The
//! asymmetry is intended: a restore must never wipe user files it knows
//! nothing about.
//!
//! ## Example
//!
//! ```rust,no_run
//! use savesync::{BackupLedger, SaveSyncConfig, UpdateOptions};
//! use std::path::Path;
//!
//! # fn main() -> savesync::Result<()> {
//! let mut ledger = BackupLedger::open(SaveSyncConfig::new("/backups"))?;
//! ledger.create("Hollow Knight", Path::new("/home/me/saves/hk"))?;
//!
//! // ... play ...
//!
//! let report = ledger.update("hollow knight", &UpdateOptions::auto())?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

use crate::catalog::PathCatalog;
use crate::config::SaveSyncConfig;
use crate::error::{Result, SaveSyncError};
use crate::event_log::{EventLog, FileEventLog, LogAction, LogEvent};
use crate::metadata::BackupMetadata;
use crate::mirror::DirectoryMirror;
use crate::name::BackupName;
use crate::snapshot::{SafetySnapshotter, SnapshotOperation};
use crate::types::{
    BackupRecord, BackupSummary, BatchEntry, BatchReport, CopyStats, CreateReport, DeleteReport,
    MirrorPlan, OperationOutcome, RestoreOptions, RestoreReport, SnapshotInfo, SnapshotOutcome,
    SnapshotPolicy, UpdateOptions, UpdateReport,
};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Named backups under one root directory
#[derive(Debug)]
pub struct BackupLedger {
    config: SaveSyncConfig,
    catalog: PathCatalog,
    snapshotter: SafetySnapshotter,
    mirror: DirectoryMirror,
    event_log: Arc<dyn EventLog>,
}

impl BackupLedger {
    /// Open the ledger for `config` with the default file-backed audit log
    ///
    /// Creates the directory layout if needed. A corrupt catalog is a fatal
    /// [`SaveSyncError::Config`].
    pub fn open(config: SaveSyncConfig) -> Result<Self> {
        BackupLedgerBuilder::new().build(config)
    }

    /// Configuration this ledger runs with
    pub fn config(&self) -> &SaveSyncConfig {
        &self.config
    }

    /// Underlying catalog
    pub fn catalog(&self) -> &PathCatalog {
        &self.catalog
    }

    /// Audit log the ledger reports to
    pub fn event_log(&self) -> &Arc<dyn EventLog> {
        &self.event_log
    }

    /// Look up a registered backup
    pub fn record(&self, name: &str) -> Result<BackupRecord> {
        self.catalog.resolve(name).cloned()
    }

    pub(crate) fn log_event(&self, event: LogEvent) {
        if let Err(e) = self.event_log.record(&event) {
            warn!("Failed to write audit log entry {}: {}", event.action, e);
        }
    }

    /// Create a new backup by copying `source_path` in full
    ///
    /// # Errors
    ///
    /// - [`SaveSyncError::InvalidName`] / [`SaveSyncError::DuplicateName`] for bad names
    /// - [`SaveSyncError::SourceNotFound`] if the source is missing, now or mid-way
    /// - [`SaveSyncError::PathInvalid`] if an unregistered directory already
    ///   occupies the backup location, or the source holds the backup root
    #[instrument(skip(self))]
    pub fn create(&mut self, name: &str, source_path: &Path) -> Result<CreateReport> {
        let name = BackupName::parse(name)?;
        if self.catalog.contains(name.as_str()) {
            return Err(SaveSyncError::DuplicateName(name.as_str().to_string()));
        }

        let source = utils::clean_user_path(source_path)?;
        utils::require_dir(&source)?;
        self.ensure_outside_root(&source)?;

        let backup_root = self.config.backup_root_for(name.as_str());
        if fs::symlink_metadata(&backup_root).is_ok() {
            return Err(SaveSyncError::path_invalid(
                &backup_root,
                "an unregistered directory already exists at the backup location",
            ));
        }

        let record = self.catalog.register(name.display_name(), &source)?;

        let excluded = self.config.excluded_names();
        let stats = match utils::copy_tree(&source, &record.backup_root, &excluded) {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Create of {} failed, rolling back: {}", record.name, e);
                if let Err(cleanup) = fs::remove_dir_all(&record.backup_root) {
                    debug!("Nothing to clean at {:?}: {}", record.backup_root, cleanup);
                }
                if let Err(unregister) = self.catalog.unregister(&record.name) {
                    warn!("Failed to roll back registration of {}: {}", record.name, unregister);
                }
                return Err(e);
            }
        };

        self.write_metadata(&record, &source);
        self.log_event(LogEvent::new(LogAction::Create, &record.name, source.display()));

        info!(
            "Created backup {} ({} files, {})",
            record.name,
            stats.files_copied,
            utils::format_bytes(stats.bytes_copied)
        );
        Ok(CreateReport { record, stats })
    }

    fn write_metadata(&self, record: &BackupRecord, source: &Path) {
        let metadata = BackupMetadata::now(&record.display_name, source);
        if let Err(e) = metadata.write(&record.backup_root, &self.config.metadata_file_name) {
            warn!("Failed to write metadata for {}: {}", record.name, e);
        }
    }

    fn read_metadata(&self, record: &BackupRecord) -> Option<BackupMetadata> {
        match BackupMetadata::read(&record.backup_root, &self.config.metadata_file_name) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Cannot read metadata for {}: {}", record.name, e);
                None
            }
        }
    }

    /// Refuse live folders that hold the root backup directory
    ///
    /// Copying or mirroring such a folder would pull the backups into
    /// themselves, and restoring into one could replace them.
    fn ensure_outside_root(&self, live: &Path) -> Result<()> {
        if utils::is_within(&self.config.root_backup_dir, live) {
            return Err(SaveSyncError::path_invalid(
                live,
                format!(
                    "contains the backup root directory {}",
                    self.config.root_backup_dir.display()
                ),
            ));
        }
        Ok(())
    }

    /// Backup root of `record`, which must still be a directory
    fn existing_backup_root(record: &BackupRecord) -> Result<&Path> {
        if record.backup_root.is_dir() {
            Ok(&record.backup_root)
        } else {
            Err(SaveSyncError::path_invalid(
                &record.backup_root,
                "backup directory is missing or not a directory",
            ))
        }
    }

    /// Pick the path an update reads from or a restore writes to
    ///
    /// Order: interactive override, metadata file, catalog record.
    pub(crate) fn resolve_live_path(
        &self,
        record: &BackupRecord,
        auto_confirm: bool,
        override_path: Option<&PathBuf>,
    ) -> Result<(PathBuf, bool)> {
        if !auto_confirm {
            if let Some(path) = override_path {
                return Ok((utils::clean_user_path(path)?, true));
            }
        }
        if let Some(metadata) = self.read_metadata(record) {
            return Ok((metadata.original_save_path, false));
        }
        Ok((record.source_path.clone(), false))
    }

    fn check_snapshot(
        outcome: &SnapshotOutcome,
        subject: &Path,
        auto_confirm: bool,
        policy: SnapshotPolicy,
    ) -> Result<()> {
        let effective = if auto_confirm {
            SnapshotPolicy::BestEffort
        } else {
            policy
        };
        match outcome {
            SnapshotOutcome::Failed { reason } if effective == SnapshotPolicy::Required => {
                Err(SaveSyncError::SnapshotRequired {
                    subject: subject.to_path_buf(),
                    reason: reason.clone(),
                })
            }
            SnapshotOutcome::Failed { reason } => {
                warn!("Continuing without safety snapshot of {:?}: {}", subject, reason);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Live save folder an update of `name` reads and a restore writes
    ///
    /// Uses the same order as those operations: `override_path`, then the
    /// metadata file inside the backup, then the catalog record.
    pub fn live_path(&self, name: &str, override_path: Option<&Path>) -> Result<PathBuf> {
        let record = self.catalog.resolve(name)?;
        let override_path = override_path.map(Path::to_path_buf);
        let (path, _) = self.resolve_live_path(record, false, override_path.as_ref())?;
        Ok(path)
    }

    /// What an update would change, without touching anything
    pub fn plan_update(&self, name: &str, source_override: Option<&Path>) -> Result<MirrorPlan> {
        let record = self.catalog.resolve(name)?;
        let backup_root = Self::existing_backup_root(record)?;
        let override_path = source_override.map(Path::to_path_buf);
        let (source, _) = self.resolve_live_path(record, false, override_path.as_ref())?;
        self.ensure_outside_root(&source)?;
        self.mirror.plan(&source, backup_root)
    }

    /// Mirror the live save folder into the backup
    ///
    /// The existing backup tree is snapshotted first. An override source
    /// given interactively is saved to the catalog once it proves usable.
    #[instrument(skip(self, options), fields(auto = options.auto_confirm))]
    pub fn update(&mut self, name: &str, options: &UpdateOptions) -> Result<UpdateReport> {
        let record = self.catalog.resolve(name)?.clone();
        let backup_root = Self::existing_backup_root(&record)?.to_path_buf();

        let (source, overridden) =
            self.resolve_live_path(&record, options.auto_confirm, options.source_override.as_ref())?;
        utils::require_dir(&source)?;
        self.ensure_outside_root(&source)?;

        if overridden && source != record.source_path {
            self.catalog.set_source_path(&record.name, &source)?;
            info!("Source of {} changed to {:?}", record.name, source);
        }

        let snapshot = self
            .snapshotter
            .snapshot(&backup_root, &record.name, SnapshotOperation::Update);
        Self::check_snapshot(&snapshot, &backup_root, options.auto_confirm, options.snapshot_policy)?;

        let mirror = self.mirror.mirror(&source, &backup_root)?;

        let record = self.catalog.touch(&record.name)?;
        self.write_metadata(&record, &source);
        self.log_event(LogEvent::new(LogAction::Update, &record.name, source.display()));

        info!("Updated backup {}: {}", record.name, mirror);
        Ok(UpdateReport {
            record,
            snapshot,
            mirror,
        })
    }

    /// Copy the backup back over the live save folder
    ///
    /// The destination is snapshotted first. Files at the destination with
    /// no counterpart in the backup are left alone.
    #[instrument(skip(self, options), fields(auto = options.auto_confirm))]
    pub fn restore(&mut self, name: &str, options: &RestoreOptions) -> Result<RestoreReport> {
        let record = self.catalog.resolve(name)?.clone();
        let backup_root = Self::existing_backup_root(&record)?.to_path_buf();

        let (destination, _) = self.resolve_live_path(
            &record,
            options.auto_confirm,
            options.destination_override.as_ref(),
        )?;

        let (snapshot, stats) = self.restore_tree(
            &record,
            &backup_root,
            &destination,
            options.auto_confirm,
            options.snapshot_policy,
        )?;
        self.log_event(LogEvent::new(LogAction::Restore, &record.name, destination.display()));

        info!(
            "Restored backup {} to {:?} ({} files)",
            record.name, destination, stats.files_copied
        );
        Ok(RestoreReport {
            record,
            destination,
            snapshot,
            stats,
        })
    }

    /// Snapshot `destination`, then copy-and-replace `tree` into it
    ///
    /// Shared by local and remote restores.
    pub(crate) fn restore_tree(
        &self,
        record: &BackupRecord,
        tree: &Path,
        destination: &Path,
        auto_confirm: bool,
        policy: SnapshotPolicy,
    ) -> Result<(SnapshotOutcome, CopyStats)> {
        utils::require_dir(tree)?;
        if destination.exists() && !destination.is_dir() {
            return Err(SaveSyncError::path_invalid(destination, "not a directory"));
        }
        self.ensure_outside_root(destination)?;

        let snapshot = self
            .snapshotter
            .snapshot(destination, &record.name, SnapshotOperation::Restore);
        Self::check_snapshot(&snapshot, destination, auto_confirm, policy)?;

        let stats = utils::copy_and_replace(tree, destination, &self.config.excluded_names())?;
        Ok((snapshot, stats))
    }

    /// Permanently delete a backup, its tree and its safety snapshots
    ///
    /// Irreversible. Front ends must confirm with the user first.
    #[instrument(skip(self))]
    pub fn delete(&mut self, name: &str) -> Result<DeleteReport> {
        let record = self.catalog.resolve(name)?.clone();

        let tree_removed = match fs::symlink_metadata(&record.backup_root) {
            Ok(meta) if meta.is_dir() => {
                fs::remove_dir_all(&record.backup_root)?;
                true
            }
            Ok(_) => {
                fs::remove_file(&record.backup_root)?;
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Backup tree {:?} was already gone", record.backup_root);
                false
            }
            Err(e) => return Err(e.into()),
        };

        let (snapshots_deleted, snapshot_failures) =
            self.snapshotter.delete_snapshots_for(&record.name);
        let record = self.catalog.unregister(&record.name)?;
        self.log_event(LogEvent::new(
            LogAction::PermanentDelete,
            &record.name,
            record.backup_root.display(),
        ));

        info!("Deleted backup {}", record.name);
        Ok(DeleteReport {
            record,
            tree_removed,
            snapshots_deleted,
            snapshot_failures,
        })
    }

    /// Update every backup unattended
    ///
    /// One failure never stops the batch.
    #[instrument(skip(self))]
    pub fn update_all(&mut self) -> BatchReport {
        let options = UpdateOptions::auto();
        let mut report = BatchReport::default();
        for name in self.catalog.names() {
            let outcome = OperationOutcome::from_result(&self.update(&name, &options));
            if !outcome.success {
                warn!("Update of {} failed: {}", name, outcome.message);
            }
            report.entries.push(BatchEntry { name, outcome });
        }
        self.log_event(LogEvent::batch(LogAction::UpdateAll));
        info!("Update all: {}", report);
        report
    }

    /// Restore every backup unattended
    #[instrument(skip(self))]
    pub fn restore_all(&mut self) -> BatchReport {
        let options = RestoreOptions::auto();
        let mut report = BatchReport::default();
        for name in self.catalog.names() {
            let outcome = OperationOutcome::from_result(&self.restore(&name, &options));
            if !outcome.success {
                warn!("Restore of {} failed: {}", name, outcome.message);
            }
            report.entries.push(BatchEntry { name, outcome });
        }
        self.log_event(LogEvent::batch(LogAction::RestoreAll));
        info!("Restore all: {}", report);
        report
    }

    /// Every registered backup with its metadata file, sorted by name
    pub fn list_backups(&self) -> Vec<BackupSummary> {
        self.catalog
            .list()
            .into_iter()
            .map(|record| {
                let metadata = self.read_metadata(&record);
                BackupSummary { record, metadata }
            })
            .collect()
    }

    /// Every safety snapshot, newest first
    pub fn list_safety_backups(&self) -> Result<Vec<SnapshotInfo>> {
        self.snapshotter.list()
    }

    /// Up to `limit` audit log lines, newest first
    pub fn view_log(&self, limit: usize) -> Result<Vec<String>> {
        self.event_log.recent(limit)
    }

    /// URL for looking up where a game keeps its saves
    pub fn save_search_url(&self, title: &str) -> String {
        self.config.save_search_url(title)
    }

    /// Write the catalog to `path`
    pub fn export_catalog(&self, path: &Path) -> Result<usize> {
        self.catalog.export_to(path)
    }

    /// Replace the catalog with an exported one
    pub fn import_catalog(&mut self, path: &Path) -> Result<usize> {
        self.catalog.import_from(path)
    }
}

/// Builder for [`BackupLedger`]
///
/// ```rust,no_run
/// use savesync::{BackupLedgerBuilder, SaveSyncConfig};
/// use savesync::event_log::MemoryEventLog;
/// use std::sync::Arc;
///
/// let log = Arc::new(MemoryEventLog::new());
/// let ledger = BackupLedgerBuilder::new()
///     .event_log(log.clone())
///     .exclude("desktop.ini")
///     .build(SaveSyncConfig::new("/backups"))
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct BackupLedgerBuilder {
    event_log: Option<Arc<dyn EventLog>>,
    extra_excluded: Vec<String>,
}

impl BackupLedgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report to this audit log instead of `root/logs/backup_log.txt`
    pub fn event_log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(log);
        self
    }

    /// Add a file name the mirror and restores must leave alone
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.extra_excluded.push(name.into());
        self
    }

    /// Create the layout, load the catalog and assemble the ledger
    pub fn build(self, mut config: SaveSyncConfig) -> Result<BackupLedger> {
        config.extra_excluded_names.extend(self.extra_excluded);
        config.validate()?;
        config.ensure_layout()?;

        let catalog = PathCatalog::open(config.catalog_path(), &config.root_backup_dir)?;
        let event_log = self
            .event_log
            .unwrap_or_else(|| Arc::new(FileEventLog::new(config.log_file())));

        debug!(
            "Opened ledger at {:?} with {} backups",
            config.root_backup_dir,
            catalog.len()
        );
        Ok(BackupLedger {
            snapshotter: SafetySnapshotter::new(config.safety_root()),
            mirror: DirectoryMirror::new(config.excluded_names()),
            catalog,
            event_log,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::MemoryEventLog;
    use tempfile::TempDir;

    struct TestEnv {
        temp_dir: TempDir,
        ledger: BackupLedger,
        log: Arc<MemoryEventLog>,
    }

    impl TestEnv {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let log = Arc::new(MemoryEventLog::new());
            let ledger = BackupLedgerBuilder::new()
                .event_log(log.clone())
                .build(SaveSyncConfig::new(temp_dir.path().join("root")))
                .unwrap();
            Self {
                temp_dir,
                ledger,
                log,
            }
        }

        fn saves(&self, name: &str) -> PathBuf {
            let path = self.temp_dir.path().join("saves").join(name);
            fs::create_dir_all(&path).unwrap();
            path
        }

        fn root(&self) -> PathBuf {
            self.temp_dir.path().join("root")
        }
    }

    #[test]
    fn test_create_copies_and_writes_metadata() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::write(source.join("a.txt"), "x").unwrap();

        let report = env.ledger.create("Foo", &source).unwrap();
        assert_eq!(report.record.name, "foo");
        assert_eq!(report.stats.files_copied, 1);

        let backup = env.root().join("foo");
        assert_eq!(fs::read_to_string(backup.join("a.txt")).unwrap(), "x");
        let metadata = BackupMetadata::read(&backup, "README.txt").unwrap().unwrap();
        assert_eq!(metadata.original_save_path, source);
        assert_eq!(metadata.game_title, "Foo");
        assert_eq!(env.log.actions(), vec![LogAction::Create]);
    }

    #[test]
    fn test_create_refuses_stale_directory() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::create_dir_all(env.root().join("foo")).unwrap();

        let err = env.ledger.create("foo", &source).unwrap_err();
        assert!(matches!(err, SaveSyncError::PathInvalid { .. }));
        assert!(!env.ledger.catalog().contains("foo"));
    }

    #[test]
    fn test_create_missing_source() {
        let mut env = TestEnv::new();
        let missing = env.temp_dir.path().join("nowhere");

        let err = env.ledger.create("foo", &missing).unwrap_err();
        assert!(matches!(err, SaveSyncError::SourceNotFound(_)));
        assert!(env.ledger.catalog().is_empty());
        assert!(!env.root().join("foo").exists());
    }

    #[test]
    fn test_create_retries_after_catalog_write_failure() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::write(source.join("a.txt"), "x").unwrap();

        // A directory where the catalog file goes makes every save fail
        let catalog_file = env.ledger.config().catalog_path();
        if catalog_file.exists() {
            fs::remove_file(&catalog_file).unwrap();
        }
        fs::create_dir(&catalog_file).unwrap();

        assert!(env.ledger.create("foo", &source).is_err());
        assert!(!env.ledger.catalog().contains("foo"));
        assert!(!env.root().join("foo").exists());

        fs::remove_dir(&catalog_file).unwrap();
        let report = env.ledger.create("foo", &source).unwrap();
        assert_eq!(report.stats.files_copied, 1);
        assert!(env.root().join("foo/a.txt").exists());
    }

    #[test]
    fn test_create_refuses_source_holding_backup_root() {
        let mut env = TestEnv::new();
        let parent = env.temp_dir.path().to_path_buf();
        fs::write(parent.join("slot.sav"), "s").unwrap();

        let err = env.ledger.create("everything", &parent).unwrap_err();
        assert!(matches!(err, SaveSyncError::PathInvalid { .. }));
        assert!(!env.ledger.catalog().contains("everything"));
        assert!(!env.root().join("everything").exists());

        let err = env.ledger.create("root", &env.root()).unwrap_err();
        assert!(matches!(err, SaveSyncError::PathInvalid { .. }));
    }

    #[test]
    fn test_create_skips_excluded_names() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("sub/README.txt"), "game notes").unwrap();
        fs::write(source.join("sub/slot.sav"), "s").unwrap();

        let report = env.ledger.create("foo", &source).unwrap();
        assert_eq!(report.stats.files_copied, 1);

        let backup = env.root().join("foo");
        assert!(backup.join("sub/slot.sav").exists());
        assert!(!backup.join("sub/README.txt").exists());

        // Nothing left behind for later mirrors to ignore
        let plan = env.ledger.plan_update("foo", None).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_update_snapshots_then_mirrors() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::write(source.join("a.txt"), "x").unwrap();
        env.ledger.create("Foo", &source).unwrap();

        fs::remove_file(source.join("a.txt")).unwrap();
        fs::write(source.join("b.txt"), "y").unwrap();

        let report = env.ledger.update("foo", &UpdateOptions::auto()).unwrap();
        assert_eq!(report.mirror.copied, 1);
        assert_eq!(report.mirror.deleted, 1);

        let backup = env.root().join("foo");
        assert!(!backup.join("a.txt").exists());
        assert_eq!(fs::read_to_string(backup.join("b.txt")).unwrap(), "y");
        assert!(backup.join("README.txt").exists());

        let snapshot = report.snapshot.path().unwrap();
        assert_eq!(fs::read_to_string(snapshot.join("a.txt")).unwrap(), "x");
        assert_eq!(env.log.actions(), vec![LogAction::Create, LogAction::Update]);
    }

    #[test]
    fn test_update_unknown_name() {
        let mut env = TestEnv::new();
        let err = env.ledger.update("ghost", &UpdateOptions::auto()).unwrap_err();
        assert!(matches!(err, SaveSyncError::NotFound(_)));
    }

    #[test]
    fn test_update_missing_backup_tree() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        env.ledger.create("foo", &source).unwrap();
        fs::remove_dir_all(env.root().join("foo")).unwrap();

        let err = env.ledger.update("foo", &UpdateOptions::auto()).unwrap_err();
        assert!(matches!(err, SaveSyncError::PathInvalid { .. }));
    }

    #[test]
    fn test_source_override_is_persisted() {
        let mut env = TestEnv::new();
        let old = env.saves("old");
        let new = env.saves("new");
        fs::write(new.join("moved.sav"), "m").unwrap();
        env.ledger.create("foo", &old).unwrap();

        let options = UpdateOptions {
            source_override: Some(new.clone()),
            ..Default::default()
        };
        env.ledger.update("foo", &options).unwrap();

        assert_eq!(env.ledger.record("foo").unwrap().source_path, new);
        assert!(env.root().join("foo/moved.sav").exists());
    }

    #[test]
    fn test_auto_confirm_ignores_override() {
        let mut env = TestEnv::new();
        let old = env.saves("old");
        let new = env.saves("new");
        env.ledger.create("foo", &old).unwrap();

        let options = UpdateOptions {
            auto_confirm: true,
            source_override: Some(new),
            ..Default::default()
        };
        env.ledger.update("foo", &options).unwrap();
        assert_eq!(env.ledger.record("foo").unwrap().source_path, old);
    }

    #[test]
    fn test_required_snapshot_aborts_update() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::write(source.join("a.txt"), "x").unwrap();
        env.ledger.create("foo", &source).unwrap();
        fs::write(source.join("b.txt"), "y").unwrap();

        // Replace the safety root with a file so no snapshot can be written
        let safety = env.ledger.config().safety_root();
        fs::remove_dir_all(&safety).unwrap();
        fs::write(&safety, "blocked").unwrap();

        let options = UpdateOptions {
            snapshot_policy: SnapshotPolicy::Required,
            ..Default::default()
        };
        let err = env.ledger.update("foo", &options).unwrap_err();
        assert!(matches!(err, SaveSyncError::SnapshotRequired { .. }));
        assert!(!env.root().join("foo/b.txt").exists());

        // Unattended mode only warns
        let report = env.ledger.update("foo", &UpdateOptions::auto()).unwrap();
        assert!(!report.snapshot.is_success());
        assert!(env.root().join("foo/b.txt").exists());
    }

    #[test]
    fn test_restore_is_non_destructive() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::write(source.join("slot1.sav"), "backed up").unwrap();
        env.ledger.create("foo", &source).unwrap();

        fs::write(source.join("slot1.sav"), "corrupted").unwrap();
        fs::write(source.join("unrelated.txt"), "keep me").unwrap();

        let report = env.ledger.restore("foo", &RestoreOptions::auto()).unwrap();
        assert_eq!(report.destination, source);
        assert_eq!(fs::read_to_string(source.join("slot1.sav")).unwrap(), "backed up");
        assert_eq!(fs::read_to_string(source.join("unrelated.txt")).unwrap(), "keep me");
        assert!(!source.join("README.txt").exists());

        let snapshot = report.snapshot.path().unwrap();
        assert_eq!(fs::read_to_string(snapshot.join("slot1.sav")).unwrap(), "corrupted");
    }

    #[test]
    fn test_restore_into_missing_folder() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::write(source.join("b.txt"), "y").unwrap();
        env.ledger.create("foo", &source).unwrap();
        fs::remove_dir_all(&source).unwrap();

        let report = env.ledger.restore("foo", &RestoreOptions::auto()).unwrap();
        assert_eq!(report.snapshot, SnapshotOutcome::NothingToProtect);
        assert_eq!(fs::read_to_string(source.join("b.txt")).unwrap(), "y");
    }

    #[test]
    fn test_restore_refuses_folder_holding_backup_root() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        env.ledger.create("foo", &source).unwrap();

        let options = RestoreOptions {
            destination_override: Some(env.temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let err = env.ledger.restore("foo", &options).unwrap_err();
        assert!(matches!(err, SaveSyncError::PathInvalid { .. }));
        assert!(env.ledger.list_safety_backups().unwrap().is_empty());
    }

    #[test]
    fn test_live_path_prefers_metadata() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        let moved = env.saves("moved");
        env.ledger.create("foo", &source).unwrap();
        BackupMetadata::now("foo", &moved)
            .write(&env.root().join("foo"), "README.txt")
            .unwrap();

        assert_eq!(env.ledger.record("foo").unwrap().source_path, source);
        assert_eq!(env.ledger.live_path("FOO", None).unwrap(), moved);

        let other = env.temp_dir.path().join("other");
        assert_eq!(env.ledger.live_path("foo", Some(&other)).unwrap(), other);

        let report = env.ledger.restore("foo", &RestoreOptions::auto()).unwrap();
        assert_eq!(report.destination, moved);
    }

    #[test]
    fn test_restore_to_other_destination() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        fs::write(source.join("b.txt"), "y").unwrap();
        env.ledger.create("foo", &source).unwrap();

        let elsewhere = env.temp_dir.path().join("elsewhere");
        let options = RestoreOptions {
            destination_override: Some(elsewhere.clone()),
            ..Default::default()
        };
        let report = env.ledger.restore("foo", &options).unwrap();
        assert_eq!(report.destination, elsewhere);
        assert!(elsewhere.join("b.txt").exists());
        // Restoring elsewhere does not move the backup's source
        assert_eq!(env.ledger.record("foo").unwrap().source_path, source);
    }

    #[test]
    fn test_delete_cascades() {
        let mut env = TestEnv::new();
        let foo = env.saves("foo");
        let foo_bar = env.saves("foo_bar");
        env.ledger.create("Foo", &foo).unwrap();
        env.ledger.create("foo_bar", &foo_bar).unwrap();
        env.ledger.update("foo", &UpdateOptions::auto()).unwrap();
        env.ledger.restore("foo", &RestoreOptions::auto()).unwrap();
        env.ledger.update("foo_bar", &UpdateOptions::auto()).unwrap();

        let report = env.ledger.delete("FOO").unwrap();
        assert!(report.tree_removed);
        assert_eq!(report.snapshots_deleted, 2);
        assert!(!env.root().join("foo").exists());
        assert!(matches!(
            env.ledger.record("foo").unwrap_err(),
            SaveSyncError::NotFound(_)
        ));

        let remaining = env.ledger.list_safety_backups().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].subject.as_deref(), Some("foo_bar"));
        assert_eq!(env.log.actions().last(), Some(&LogAction::PermanentDelete));
    }

    #[test]
    fn test_update_all_continues_past_failures() {
        let mut env = TestEnv::new();
        let a = env.saves("a");
        let b = env.saves("b");
        fs::write(a.join("1"), "1").unwrap();
        env.ledger.create("a", &a).unwrap();
        env.ledger.create("b", &b).unwrap();
        fs::remove_dir_all(&a).unwrap();

        let report = env.ledger.update_all();
        assert_eq!(report.total(), 2);
        assert!(!report.get("a").unwrap().success);
        assert!(report.get("b").unwrap().success);

        let last = env.log.events().pop().unwrap();
        assert_eq!(last.action, LogAction::UpdateAll);
        assert_eq!(last.name, "ALL");
    }

    #[test]
    fn test_restore_all() {
        let mut env = TestEnv::new();
        let a = env.saves("a");
        fs::write(a.join("1"), "1").unwrap();
        env.ledger.create("a", &a).unwrap();
        fs::remove_file(a.join("1")).unwrap();

        let report = env.ledger.restore_all();
        assert_eq!(report.succeeded(), 1);
        assert!(a.join("1").exists());
        assert_eq!(env.log.actions().last(), Some(&LogAction::RestoreAll));
    }

    #[test]
    fn test_list_backups_with_metadata() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        env.ledger.create("Zelda", &source).unwrap();
        env.ledger.create("Astro", &source).unwrap();

        let listed = env.ledger.list_backups();
        let names: Vec<_> = listed.iter().map(|s| s.record.name.as_str()).collect();
        assert_eq!(names, vec!["astro", "zelda"]);
        assert_eq!(listed[1].metadata.as_ref().unwrap().game_title, "Zelda");
    }

    #[test]
    fn test_plan_update_is_dry() {
        let mut env = TestEnv::new();
        let source = env.saves("foo");
        env.ledger.create("foo", &source).unwrap();
        fs::write(source.join("new.sav"), "n").unwrap();

        let plan = env.ledger.plan_update("foo", None).unwrap();
        assert_eq!(plan.new_files(), 1);
        assert!(!env.root().join("foo/new.sav").exists());
        assert!(env.ledger.list_safety_backups().unwrap().is_empty());
    }

    #[test]
    fn test_file_log_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = SaveSyncConfig::new(temp_dir.path().join("root"));
        let mut ledger = BackupLedger::open(config.clone()).unwrap();
        let source = temp_dir.path().join("saves");
        fs::create_dir_all(&source).unwrap();

        ledger.create("foo", &source).unwrap();
        let lines = ledger.view_log(20).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("CREATE: foo | Path: "));
        assert!(config.log_file().exists());
    }
}
