//! Main test module for SaveSync
//!
//! This module includes all test suites:
//! - Scenario tests for the backup lifecycle end to end
//! - Property-based tests for mirror invariants

pub mod property;
pub mod scenarios;

#[cfg(test)]
mod edge_cases {
    use ::savesync::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ledger(root: &TempDir) -> BackupLedger {
        BackupLedgerBuilder::new()
            .event_log(Arc::new(MemoryEventLog::new()))
            .build(SaveSyncConfig::new(root.path()))
            .unwrap()
    }

    #[test]
    fn test_empty_save_folder() {
        let saves = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let mut ledger = ledger(&root);

        let created = ledger.create("Empty", saves.path()).unwrap();
        assert_eq!(created.stats.files_copied, 0);

        let updated = ledger.update("empty", &UpdateOptions::auto()).unwrap();
        assert!(!updated.mirror.has_changes());
    }

    #[test]
    fn test_unicode_filenames() {
        let saves = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let mut ledger = ledger(&root);

        let names = ["файл.sav", "文件.sav", "セーブ.dat", "🚀.sav"];
        let mut created_files = Vec::new();
        for name in &names {
            if fs::write(saves.path().join(name), format!("data {}", name)).is_ok() {
                created_files.push(*name);
            }
        }
        if created_files.is_empty() {
            return;
        }

        ledger.create("Ünïcode", saves.path()).unwrap();
        for name in &created_files {
            fs::remove_file(saves.path().join(name)).unwrap();
        }
        ledger.restore("ÜNÏCODE", &RestoreOptions::auto()).unwrap();

        for name in &created_files {
            let content = fs::read_to_string(saves.path().join(name)).unwrap();
            assert_eq!(content, format!("data {}", name));
        }
    }

    #[test]
    fn test_permission_preservation() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let saves = TempDir::new().unwrap();
            let root = TempDir::new().unwrap();
            let mut ledger = ledger(&root);

            let files = [("profile.sav", 0o644), ("launcher.sh", 0o755), ("locked.sav", 0o444)];
            for (name, mode) in &files {
                let path = saves.path().join(name);
                fs::write(&path, name).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(*mode)).unwrap();
            }

            ledger.create("perms", saves.path()).unwrap();

            for (name, expected) in &files {
                let mode = fs::metadata(root.path().join("perms").join(name))
                    .unwrap()
                    .permissions()
                    .mode()
                    & 0o777;
                assert_eq!(mode, *expected, "mode mismatch for {}", name);
            }
        }
    }

    #[test]
    fn test_symlinks_are_copied_as_links() {
        #[cfg(unix)]
        {
            let saves = TempDir::new().unwrap();
            let root = TempDir::new().unwrap();
            let mut ledger = ledger(&root);

            fs::write(saves.path().join("slot1.sav"), "one").unwrap();
            std::os::unix::fs::symlink("slot1.sav", saves.path().join("latest.sav")).unwrap();

            ledger.create("links", saves.path()).unwrap();

            let copied = root.path().join("links/latest.sav");
            assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
            assert_eq!(fs::read_link(&copied).unwrap(), std::path::Path::new("slot1.sav"));
        }
    }

    #[test]
    fn test_name_that_is_a_prefix_keeps_other_snapshots() {
        let saves_a = TempDir::new().unwrap();
        let saves_b = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let mut ledger = ledger(&root);

        fs::write(saves_a.path().join("a.sav"), "a").unwrap();
        fs::write(saves_b.path().join("b.sav"), "b").unwrap();
        ledger.create("foo", saves_a.path()).unwrap();
        ledger.create("foo_bar", saves_b.path()).unwrap();
        ledger.update("foo", &UpdateOptions::auto()).unwrap();
        ledger.update("foo_bar", &UpdateOptions::auto()).unwrap();

        let report = ledger.delete("foo").unwrap();
        assert_eq!(report.snapshots_deleted, 1);

        let left = ledger.list_safety_backups().unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].name.starts_with("foo_bar_update_"));
    }
}
