//! Property-based testing for the directory mirror
//!
//! Uses proptest to check mirror invariants over randomly generated source
//! and target trees.

use ::savesync::mirror::DirectoryMirror;
use filetime::{set_file_mtime, FileTime};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

const EXCLUDED: &str = "README.txt";

/// Relative file paths; directories start with `d`, files with `f`, so a
/// name is never both
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    (prop::option::of("d[0-3]"), "f[0-9]{1,2}\\.(sav|dat)").prop_map(|(dir, file)| match dir {
        Some(dir) => PathBuf::from(dir).join(file),
        None => PathBuf::from(file),
    })
}

fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        "[a-z0-9 ]{0,64}".prop_map(|s| s.into_bytes()),
        prop::collection::vec(any::<u8>(), 0..512),
    ]
}

fn tree_strategy() -> impl Strategy<Value = BTreeMap<PathBuf, Vec<u8>>> {
    prop::collection::btree_map(path_strategy(), content_strategy(), 0..12)
}

/// Write `files` under `root`, all with the given modification time
fn materialize(root: &Path, files: &BTreeMap<PathBuf, Vec<u8>>, mtime: i64) {
    fs::create_dir_all(root).unwrap();
    for (rel, content) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }
}

/// Every regular file under `root`, by relative path
fn snapshot_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn mirror() -> DirectoryMirror {
    DirectoryMirror::new([EXCLUDED])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After a mirror the target holds exactly the source's files
    #[test]
    fn prop_mirror_makes_trees_equal(source in tree_strategy(), target in tree_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        // Target copies are older, so every shared path is refreshed
        materialize(&dst, &target, 1_000_000);
        materialize(&src, &source, 2_000_000);

        let report = mirror().mirror(&src, &dst).unwrap();

        prop_assert_eq!(report.failed(), 0);
        prop_assert_eq!(snapshot_tree(&dst), source);
    }

    /// Files only in the target are deleted, and nothing else is
    #[test]
    fn prop_mirror_deletes_orphans(source in tree_strategy(), target in tree_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        materialize(&dst, &target, 1_000_000);
        materialize(&src, &source, 2_000_000);

        let orphans = target.keys().filter(|p| !source.contains_key(*p)).count();
        let report = mirror().mirror(&src, &dst).unwrap();

        prop_assert_eq!(report.deleted, orphans);
        for path in target.keys().filter(|p| !source.contains_key(*p)) {
            prop_assert!(!dst.join(path).exists());
        }
    }

    /// A second mirror right after the first has nothing to do
    #[test]
    fn prop_mirror_is_idempotent(source in tree_strategy(), target in tree_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        materialize(&dst, &target, 1_000_000);
        materialize(&src, &source, 2_000_000);

        mirror().mirror(&src, &dst).unwrap();
        let plan = mirror().plan(&src, &dst).unwrap();

        prop_assert!(plan.is_empty());
        prop_assert_eq!(plan.unchanged, source.len());
    }

    /// Excluded names are neither copied nor deleted
    #[test]
    fn prop_mirror_respects_exclusions(
        source in tree_strategy(),
        source_readme in content_strategy(),
        target_readme in content_strategy(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        materialize(&src, &source, 2_000_000);
        fs::write(src.join(EXCLUDED), &source_readme).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join(EXCLUDED), &target_readme).unwrap();

        mirror().mirror(&src, &dst).unwrap();

        prop_assert_eq!(fs::read(dst.join(EXCLUDED)).unwrap(), target_readme);
        let mut after = snapshot_tree(&dst);
        after.remove(Path::new(EXCLUDED));
        prop_assert_eq!(after, source);
    }
}
