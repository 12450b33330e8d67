//! End-to-end scenarios for the backup lifecycle
//!
//! Each test drives a [`BackupLedger`] over real temporary directories and
//! checks the resulting trees, snapshots and audit log.

use ::savesync::remote::{MemoryBlobStore, RemoteBackups};
use ::savesync::*;
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Test harness holding a save folder, a backup root and a ledger
pub struct SaveSyncHarness {
    pub saves: TempDir,
    pub root: TempDir,
    pub log: Arc<MemoryEventLog>,
    pub ledger: BackupLedger,
}

impl SaveSyncHarness {
    pub fn new() -> Self {
        let saves = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let log = Arc::new(MemoryEventLog::new());
        let ledger = BackupLedgerBuilder::new()
            .event_log(log.clone())
            .build(SaveSyncConfig::new(root.path()))
            .unwrap();
        Self {
            saves,
            root,
            log,
            ledger,
        }
    }

    /// The live save folder, `saves/foo`
    pub fn live(&self) -> PathBuf {
        self.saves.path().join("foo")
    }

    pub fn write_live(&self, rel: &str, content: &str) {
        let path = self.live().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Scenario A setup: `Foo` backing up `saves/foo` with `a.txt`
    pub fn with_foo() -> Self {
        let mut harness = Self::new();
        harness.write_live("a.txt", "x");
        let live = harness.live();
        harness.ledger.create("Foo", &live).unwrap();
        harness
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.path().join("foo")
    }
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn scenario_a_create_copies_tree_and_writes_metadata() {
    let harness = SaveSyncHarness::with_foo();

    assert_eq!(read(harness.backup_dir().join("a.txt")), "x");

    let metadata = BackupMetadata::read(&harness.backup_dir(), "README.txt")
        .unwrap()
        .unwrap();
    assert_eq!(metadata.game_title, "Foo");
    assert_eq!(metadata.original_save_path, harness.live());
    assert!(metadata.backup_date.is_some());
}

#[test]
fn scenario_b_update_mirrors_and_snapshots_first() {
    let mut harness = SaveSyncHarness::with_foo();
    fs::remove_file(harness.live().join("a.txt")).unwrap();
    harness.write_live("b.txt", "y");

    let report = harness.ledger.update("Foo", &UpdateOptions::auto()).unwrap();

    assert!(!harness.backup_dir().join("a.txt").exists());
    assert_eq!(read(harness.backup_dir().join("b.txt")), "y");
    assert_eq!(report.mirror.deleted, 1);

    let snapshot = report.snapshot.path().unwrap();
    assert!(snapshot.starts_with(harness.root.path().join("logs/safety_backups")));
    assert_eq!(read(snapshot.join("a.txt")), "x");
}

#[test]
fn scenario_c_restore_recreates_missing_live_folder() {
    let mut harness = SaveSyncHarness::with_foo();
    fs::remove_file(harness.live().join("a.txt")).unwrap();
    harness.write_live("b.txt", "y");
    harness.ledger.update("Foo", &UpdateOptions::auto()).unwrap();

    fs::remove_dir_all(harness.live()).unwrap();
    let report = harness.ledger.restore("Foo", &RestoreOptions::auto()).unwrap();

    assert_eq!(read(harness.live().join("b.txt")), "y");
    assert_eq!(report.snapshot, SnapshotOutcome::NothingToProtect);
    assert!(report.snapshot.is_success());
    // The metadata file stays with the backup
    assert!(!harness.live().join("README.txt").exists());
}

#[test]
fn scenario_d_delete_removes_tree_snapshots_and_record() {
    let mut harness = SaveSyncHarness::with_foo();
    harness.write_live("b.txt", "y");
    harness.ledger.update("Foo", &UpdateOptions::auto()).unwrap();
    harness.ledger.restore("Foo", &RestoreOptions::auto()).unwrap();
    assert_eq!(harness.ledger.list_safety_backups().unwrap().len(), 2);

    let report = harness.ledger.delete("Foo").unwrap();

    assert!(report.tree_removed);
    assert_eq!(report.snapshots_deleted, 2);
    assert!(!harness.backup_dir().exists());
    assert!(harness.ledger.list_safety_backups().unwrap().is_empty());
    assert!(matches!(
        harness.ledger.record("Foo"),
        Err(SaveSyncError::NotFound(_))
    ));
    // The live folder is never touched by delete
    assert_eq!(read(harness.live().join("b.txt")), "y");
}

#[test]
fn test_name_variants_resolve_to_one_backup() {
    let mut harness = SaveSyncHarness::with_foo();

    for variant in ["foo", "FOO", "  Foo  ", "fOo"] {
        assert_eq!(harness.ledger.record(variant).unwrap().name, "foo");
    }

    let live = harness.live();
    assert!(matches!(
        harness.ledger.create(" FOO ", &live),
        Err(SaveSyncError::DuplicateName(_))
    ));
    assert!(matches!(
        harness.ledger.create("bad/name", &live),
        Err(SaveSyncError::InvalidName { .. })
    ));
    assert!(matches!(
        harness.ledger.create("   ", &live),
        Err(SaveSyncError::InvalidName { .. })
    ));
}

#[test]
fn test_create_requires_existing_source() {
    let mut harness = SaveSyncHarness::new();
    let missing = harness.saves.path().join("nowhere");

    let err = harness.ledger.create("ghost", &missing).unwrap_err();
    assert!(matches!(err, SaveSyncError::SourceNotFound(_)));
    assert!(harness.ledger.list_backups().is_empty());
    assert!(!harness.root.path().join("ghost").exists());
}

#[test]
fn test_backup_root_inside_save_folder() {
    let saves = TempDir::new().unwrap();
    fs::write(saves.path().join("slot1.sav"), "one").unwrap();
    let root = saves.path().join("backups");
    let mut ledger = BackupLedgerBuilder::new()
        .event_log(Arc::new(MemoryEventLog::new()))
        .build(SaveSyncConfig::new(&root))
        .unwrap();

    let err = ledger.create("Everything", saves.path()).unwrap_err();
    assert!(matches!(err, SaveSyncError::PathInvalid { .. }));
    assert!(ledger.list_backups().is_empty());
    assert!(!root.join("everything").exists());

    // A sibling folder next to the root is fine
    let slot = saves.path().join("slot");
    fs::create_dir_all(&slot).unwrap();
    fs::write(slot.join("a.sav"), "a").unwrap();
    ledger.create("Slot", &slot).unwrap();
    assert_eq!(read(root.join("slot/a.sav")), "a");
}

#[test]
fn test_restore_keeps_unrelated_live_files() {
    let mut harness = SaveSyncHarness::with_foo();
    harness.write_live("screenshots/shot1.png", "pixels");
    harness.write_live("a.txt", "edited");

    harness.ledger.restore("foo", &RestoreOptions::auto()).unwrap();

    assert_eq!(read(harness.live().join("a.txt")), "x");
    assert_eq!(read(harness.live().join("screenshots/shot1.png")), "pixels");
}

#[test]
fn test_restore_replaces_directories_wholesale() {
    let mut harness = SaveSyncHarness::new();
    harness.write_live("slots/1.sav", "one");
    let live = harness.live();
    harness.ledger.create("foo", &live).unwrap();

    harness.write_live("slots/2.sav", "two");
    harness.ledger.restore("foo", &RestoreOptions::auto()).unwrap();

    assert_eq!(read(harness.live().join("slots/1.sav")), "one");
    assert!(!harness.live().join("slots/2.sav").exists());
}

#[test]
fn test_restore_snapshot_holds_pre_restore_state() {
    let mut harness = SaveSyncHarness::with_foo();
    harness.write_live("a.txt", "progress I might want back");

    let report = harness.ledger.restore("foo", &RestoreOptions::auto()).unwrap();

    let snapshot = report.snapshot.path().unwrap();
    assert_eq!(read(snapshot.join("a.txt")), "progress I might want back");
    assert_eq!(read(harness.live().join("a.txt")), "x");
}

#[test]
fn test_update_only_copies_newer_files() {
    let mut harness = SaveSyncHarness::with_foo();
    harness.write_live("b.txt", "y");
    harness.ledger.update("foo", &UpdateOptions::auto()).unwrap();

    // Backup copy looks newer than the live file: left alone
    fs::write(harness.backup_dir().join("b.txt"), "backup edit").unwrap();
    set_file_mtime(harness.live().join("b.txt"), FileTime::from_unix_time(1_000_000, 0)).unwrap();
    let report = harness.ledger.update("foo", &UpdateOptions::auto()).unwrap();
    assert_eq!(report.mirror.copied, 0);
    assert_eq!(read(harness.backup_dir().join("b.txt")), "backup edit");

    // Live file strictly newer: copied
    set_file_mtime(harness.live().join("b.txt"), FileTime::from_unix_time(4_000_000_000, 0)).unwrap();
    let report = harness.ledger.update("foo", &UpdateOptions::auto()).unwrap();
    assert_eq!(report.mirror.copied, 1);
    assert_eq!(read(harness.backup_dir().join("b.txt")), "y");
}

#[test]
fn test_update_with_source_override_is_remembered() {
    let mut harness = SaveSyncHarness::with_foo();
    let moved = harness.saves.path().join("moved");
    fs::create_dir_all(&moved).unwrap();
    fs::write(moved.join("c.txt"), "z").unwrap();

    let options = UpdateOptions {
        auto_confirm: false,
        source_override: Some(moved.clone()),
        snapshot_policy: SnapshotPolicy::Required,
    };
    harness.ledger.update("foo", &options).unwrap();

    assert_eq!(harness.ledger.record("foo").unwrap().source_path, moved);
    assert_eq!(read(harness.backup_dir().join("c.txt")), "z");
    assert!(!harness.backup_dir().join("a.txt").exists());
}

#[test]
fn test_dry_run_changes_nothing() {
    let mut harness = SaveSyncHarness::with_foo();
    harness.write_live("b.txt", "y");
    let before = harness.log.events().len();

    let plan = harness.ledger.plan_update("foo", None).unwrap();

    assert_eq!(plan.new_files(), 1);
    assert!(!harness.backup_dir().join("b.txt").exists());
    assert!(harness.ledger.list_safety_backups().unwrap().is_empty());
    assert_eq!(harness.log.events().len(), before);
}

#[test]
fn test_batch_operations_continue_past_failures() {
    let mut harness = SaveSyncHarness::with_foo();
    let other = harness.saves.path().join("bar");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("save.dat"), "bar").unwrap();
    harness.ledger.create("Bar", &other).unwrap();

    fs::remove_dir_all(&other).unwrap();
    harness.write_live("b.txt", "y");

    let report = harness.ledger.update_all();
    assert_eq!(report.total(), 2);
    assert_eq!(report.succeeded(), 1);
    assert!(report.get("foo").unwrap().success);
    assert!(!report.get("bar").unwrap().success);
    assert_eq!(read(harness.backup_dir().join("b.txt")), "y");

    fs::remove_dir_all(harness.live()).unwrap();
    let report = harness.ledger.restore_all();
    assert_eq!(report.succeeded(), 2);
    assert_eq!(read(other.join("save.dat")), "bar");
    assert_eq!(read(harness.live().join("b.txt")), "y");

    let events = harness.log.events();
    let batch: Vec<_> = events.iter().filter(|e| e.name == "ALL").collect();
    assert_eq!(batch.len(), 2);
}

#[test]
fn test_audit_log_file_lines() {
    let saves = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    fs::write(saves.path().join("save.dat"), "1").unwrap();

    let mut ledger = BackupLedger::open(SaveSyncConfig::new(root.path())).unwrap();
    ledger.create("Foo", saves.path()).unwrap();
    ledger.update("foo", &UpdateOptions::auto()).unwrap();

    let lines = ledger.view_log(10).unwrap();
    assert_eq!(lines.len(), 2);
    // Newest first
    assert!(lines[0].contains("] UPDATE: foo | Path: "));
    assert!(lines[1].contains("] CREATE: foo | Path: "));
    assert!(root.path().join("logs/backup_log.txt").is_file());
}

#[test]
fn test_export_and_import_catalog() {
    let mut harness = SaveSyncHarness::with_foo();
    let export = harness.saves.path().join("catalog-export.json");
    assert_eq!(harness.ledger.export_catalog(&export).unwrap(), 1);

    let other_root = TempDir::new().unwrap();
    let mut other = BackupLedgerBuilder::new()
        .event_log(Arc::new(MemoryEventLog::new()))
        .build(SaveSyncConfig::new(other_root.path()))
        .unwrap();
    assert_eq!(other.import_catalog(&export).unwrap(), 1);

    let record = other.record("foo").unwrap();
    assert_eq!(record.source_path, harness.live());
    assert_eq!(record.backup_root, other_root.path().join("foo"));
}

#[test]
fn test_remote_round_trip() {
    let mut harness = SaveSyncHarness::with_foo();
    harness.write_live("slots/1.sav", "slot one");
    harness.ledger.update("foo", &UpdateOptions::auto()).unwrap();

    let remote = RemoteBackups::new(MemoryBlobStore::new(), "SaveSync Backups");
    let pushed = remote.push(&harness.ledger, "Foo").unwrap();
    assert_eq!(pushed.manifest.file_count, 2);

    let listed = remote.list("foo").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].folder, pushed.folder);

    fs::remove_dir_all(harness.live()).unwrap();
    let pulled = remote
        .pull(&harness.ledger, "foo", None, &RestoreOptions::auto())
        .unwrap();
    assert_eq!(pulled.folder, pushed.folder);
    assert_eq!(read(harness.live().join("a.txt")), "x");
    assert_eq!(read(harness.live().join("slots/1.sav")), "slot one");

    remote.delete(&harness.ledger, "foo", &pushed.folder).unwrap();
    assert!(remote.list("foo").unwrap().is_empty());

    let actions = harness.log.actions();
    assert!(actions.contains(&LogAction::RemoteUpload));
    assert!(actions.contains(&LogAction::RemoteRestore));
    assert!(actions.contains(&LogAction::RemoteDelete));
}
