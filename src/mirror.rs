//! One-way directory mirroring
//!
//! [`DirectoryMirror`] makes a target tree's file set and contents match a
//! source tree, deleting target-only files, while leaving a fixed set of
//! excluded file names alone on both sides.
//!
//! ## Algorithm
//!
//! 1. Walk the source and collect every non-directory entry by relative
//!    path, minus excluded names.
//! 2. Walk the target the same way.
//! 3. Copy each source file that is absent from the target, or whose
//!    modification time is strictly newer than the target's.
//! 4. Delete each target file absent from the source.
//! 5. Remove directories left empty in the target, deepest first.
//!
//! Steps 1 and 2 produce a [`MirrorPlan`] that can be inspected without
//! touching anything (dry run); steps 3 to 5 apply it.
//!
//! Staleness is decided by modification time only. Equal timestamps count as
//! up to date, so a file edited within the same second as the previous copy
//! is missed. Copies preserve the source modification time, which makes a
//! second run over an unchanged source copy nothing.
//!
//! ## Failure handling
//!
//! Only an unusable source root is an error. Any single file that cannot be
//! read, copied or deleted is logged, recorded in the report and skipped.
//! When part of the source cannot be walked, target files under that part
//! are kept rather than treated as orphans.
//!
//! The pass is not atomic. A crash leaves the target partially updated; the
//! safety snapshot taken by the caller is the recovery path.

use crate::error::{Result, SaveSyncError};
use crate::types::{CopyReason, FileAction, FileFailure, MirrorPlan, MirrorReport, PlannedCopy};
use crate::utils;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, instrument, trace, warn};
use walkdir::WalkDir;

/// Files found by one side of the walk
#[derive(Debug, Default)]
struct TreeListing {
    /// Relative path -> modification time
    files: BTreeMap<PathBuf, SystemTime>,
    /// Relative directories that could not be fully read
    unreadable: Vec<PathBuf>,
    failures: Vec<FileFailure>,
}

impl TreeListing {
    fn is_under_unreadable(&self, path: &Path) -> bool {
        self.unreadable.iter().any(|dir| path.starts_with(dir))
    }
}

/// One-way mirror with a fixed exclusion set
///
/// # Examples
///
/// ```rust,no_run
/// use savesync::mirror::DirectoryMirror;
/// use std::path::Path;
///
/// let mirror = DirectoryMirror::new(["README.txt"]);
/// let plan = mirror.plan(Path::new("/saves/foo"), Path::new("/backups/foo"))?;
/// println!("{} to copy, {} to delete", plan.to_copy.len(), plan.to_delete.len());
///
/// let report = mirror.apply(&plan)?;
/// println!("{}", report);
/// # Ok::<(), savesync::SaveSyncError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct DirectoryMirror {
    excluded: BTreeSet<String>,
}

impl DirectoryMirror {
    /// Mirror that never touches files with these names
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    /// Names excluded on both sides
    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    fn is_excluded(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.excluded.contains(name.to_string_lossy().as_ref()))
    }

    /// Collect non-directory entries under `root`
    fn list_tree(&self, root: &Path) -> TreeListing {
        let mut listing = TreeListing::default();

        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    warn!("Failed to read {:?}: {}", path, e);
                    let relative = utils::make_relative(&path, root).unwrap_or_default();
                    listing.unreadable.push(relative);
                    listing.failures.push(FileFailure::new(path, FileAction::Walk, e));
                    continue;
                }
            };

            if entry.file_type().is_dir() || self.is_excluded(entry.path()) {
                continue;
            }

            let relative = match utils::make_relative(entry.path(), root) {
                Ok(relative) => relative,
                Err(e) => {
                    warn!("Skipping {:?}: {}", entry.path(), e);
                    listing
                        .failures
                        .push(FileFailure::new(entry.path(), FileAction::Walk, e));
                    continue;
                }
            };

            let mtime = entry
                .metadata()
                .map_err(SaveSyncError::from)
                .and_then(|m| Ok(m.modified()?));
            match mtime {
                Ok(mtime) => {
                    listing.files.insert(relative, mtime);
                }
                Err(e) => {
                    warn!("Failed to stat {:?}: {}", entry.path(), e);
                    listing.unreadable.push(relative);
                    listing
                        .failures
                        .push(FileFailure::new(entry.path(), FileAction::Walk, e));
                }
            }
        }

        listing
    }

    /// Compute what a mirror from `source` to `target` would do
    ///
    /// A missing target is treated as empty.
    ///
    /// # Errors
    ///
    /// - [`SaveSyncError::SourceNotFound`](crate::SaveSyncError::SourceNotFound) if `source` is missing
    /// - [`SaveSyncError::PathInvalid`](crate::SaveSyncError::PathInvalid) if either side is not a directory
    #[instrument(skip(self))]
    pub fn plan(&self, source: &Path, target: &Path) -> Result<MirrorPlan> {
        utils::require_dir(source)?;
        if target.exists() && !target.is_dir() {
            return Err(SaveSyncError::path_invalid(target, "not a directory"));
        }

        let source_listing = self.list_tree(source);
        let target_listing = if target.exists() {
            self.list_tree(target)
        } else {
            TreeListing::default()
        };

        let mut plan = MirrorPlan {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            ..Default::default()
        };

        for (path, source_mtime) in &source_listing.files {
            match target_listing.files.get(path) {
                None => plan.to_copy.push(PlannedCopy {
                    path: path.clone(),
                    reason: CopyReason::New,
                }),
                Some(target_mtime) if source_mtime > target_mtime => {
                    plan.to_copy.push(PlannedCopy {
                        path: path.clone(),
                        reason: CopyReason::Modified,
                    })
                }
                Some(_) => plan.unchanged += 1,
            }
        }

        for path in target_listing.files.keys() {
            if source_listing.files.contains_key(path) {
                continue;
            }
            if source_listing.is_under_unreadable(path) {
                debug!("Keeping {:?}: its source directory could not be read", path);
                continue;
            }
            plan.to_delete.push(path.clone());
        }

        plan.walk_failures = source_listing.failures;
        plan.walk_failures.extend(target_listing.failures);

        debug!(
            "Mirror plan: {} new, {} modified, {} to delete, {} unchanged",
            plan.new_files(),
            plan.modified_files(),
            plan.to_delete.len(),
            plan.unchanged
        );
        Ok(plan)
    }

    /// Execute a plan produced by [`plan`](Self::plan)
    #[instrument(skip(self, plan), fields(source = ?plan.source, target = ?plan.target))]
    pub fn apply(&self, plan: &MirrorPlan) -> Result<MirrorReport> {
        let start = Instant::now();
        fs::create_dir_all(&plan.target)?;

        let mut report = MirrorReport {
            unchanged: plan.unchanged,
            failures: plan.walk_failures.clone(),
            ..Default::default()
        };

        for planned in &plan.to_copy {
            let from = plan.source.join(&planned.path);
            let to = plan.target.join(&planned.path);
            match utils::copy_entry(&from, &to) {
                Ok(bytes) => {
                    trace!("Copied {:?} ({:?})", planned.path, planned.reason);
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                Err(e) => {
                    warn!("Failed to copy {:?}: {}", from, e);
                    report.failures.push(FileFailure::new(from, FileAction::Copy, e));
                }
            }
        }

        for relative in &plan.to_delete {
            let path = plan.target.join(relative);
            match fs::remove_file(&path) {
                Ok(()) => {
                    trace!("Deleted {:?}", relative);
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to delete {:?}: {}", path, e);
                    report.failures.push(FileFailure::new(path, FileAction::Delete, e));
                }
            }
        }

        report.dirs_pruned = self.prune_empty_dirs(&plan.target, &mut report.failures);
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Mirrored {:?} -> {:?}: {}",
            plan.source, plan.target, report
        );
        Ok(report)
    }

    /// Plan and apply in one step
    pub fn mirror(&self, source: &Path, target: &Path) -> Result<MirrorReport> {
        let plan = self.plan(source, target)?;
        self.apply(&plan)
    }

    /// Remove empty directories below `root`, deepest first
    fn prune_empty_dirs(&self, root: &Path, failures: &mut Vec<FileFailure>) -> usize {
        let mut pruned = 0;
        let dirs = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .contents_first(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir());

        for entry in dirs {
            match utils::remove_dir_if_empty(entry.path()) {
                Ok(true) => pruned += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to prune {:?}: {}", entry.path(), e);
                    failures.push(FileFailure::new(entry.path(), FileAction::RemoveDir, e));
                }
            }
        }
        pruned
    }
}
