//! Safety snapshots taken before a mutating operation
//!
//! Before an update overwrites a backup tree, or a restore overwrites a live
//! save folder, the [`SafetySnapshotter`] copies the current state aside:
//!
//! ```text
//! <safety_root>/<subject>_<operation>_<YYYYmmddHHMMSS>[-N]/
//! ```
//!
//! Snapshots are never cleaned up automatically. The only removal path is
//! [`SafetySnapshotter::delete_snapshots_for`], called when the owning backup
//! is deleted.
//!
//! A failed snapshot is reported through [`SnapshotOutcome::Failed`], not as an
//! error; the caller decides from its [`SnapshotPolicy`](crate::SnapshotPolicy)
//! whether to carry on.

use crate::error::Result;
use crate::types::{FileAction, FileFailure, SnapshotInfo, SnapshotOutcome};
use crate::utils;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Timestamp embedded in snapshot directory names
const SNAPSHOT_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Operation a snapshot protects against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotOperation {
    /// Taken of a backup tree before it is mirrored over
    Update,
    /// Taken of a live folder before a backup is restored into it
    Restore,
}

impl SnapshotOperation {
    /// Label used in directory names
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOperation::Update => "update",
            SnapshotOperation::Restore => "restore",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "update" => Some(SnapshotOperation::Update),
            "restore" => Some(SnapshotOperation::Restore),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of a snapshot directory name
#[derive(Debug, Clone, PartialEq, Eq)]
struct SnapshotName<'a> {
    subject: &'a str,
    operation: SnapshotOperation,
    taken_at: NaiveDateTime,
}

/// Split `{subject}_{operation}_{timestamp}[-N]`
fn parse_snapshot_name(dir_name: &str) -> Option<SnapshotName<'_>> {
    let mut parts = dir_name.rsplitn(3, '_');
    let stamp = parts.next()?;
    let operation = SnapshotOperation::from_label(parts.next()?)?;
    let subject = parts.next()?;
    if subject.is_empty() {
        return None;
    }
    let stamp = stamp.split_once('-').map_or(stamp, |(base, _)| base);
    let taken_at = NaiveDateTime::parse_from_str(stamp, SNAPSHOT_TIME_FORMAT).ok()?;
    Some(SnapshotName {
        subject,
        operation,
        taken_at,
    })
}

/// Whether `dir_name` is a snapshot of the backup called `name`
///
/// A bare prefix test would let `foo` claim the snapshots of `foo_bar`, so the
/// remainder after `{name}_` must itself be `{operation}_{timestamp}`.
fn belongs_to(dir_name: &str, name: &str) -> bool {
    parse_snapshot_name(dir_name).is_some_and(|parsed| parsed.subject == name)
}

/// Writes and enumerates safety snapshots under one root directory
#[derive(Debug, Clone)]
pub struct SafetySnapshotter {
    safety_root: PathBuf,
}

impl SafetySnapshotter {
    /// Snapshotter writing under `safety_root`
    pub fn new(safety_root: impl Into<PathBuf>) -> Self {
        Self {
            safety_root: safety_root.into(),
        }
    }

    /// Directory snapshots are written to
    pub fn root(&self) -> &Path {
        &self.safety_root
    }

    /// Copy `subject_path` aside before `operation` mutates it
    ///
    /// A subject that does not exist yields
    /// [`SnapshotOutcome::NothingToProtect`]. Per-file copy failures leave a
    /// partial snapshot that is still reported as created, with the failures
    /// in its stats.
    #[instrument(skip(self))]
    pub fn snapshot(
        &self,
        subject_path: &Path,
        subject_name: &str,
        operation: SnapshotOperation,
    ) -> SnapshotOutcome {
        match fs::symlink_metadata(subject_path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Nothing to snapshot at {:?}", subject_path);
                return SnapshotOutcome::NothingToProtect;
            }
            Err(e) => {
                warn!("Cannot inspect {:?} for snapshot: {}", subject_path, e);
                return SnapshotOutcome::Failed {
                    reason: e.to_string(),
                };
            }
            Ok(_) => {}
        }

        let destination = match self.reserve_dir(subject_name, operation) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Cannot create snapshot directory for {}: {}", subject_name, e);
                return SnapshotOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        match utils::copy_tree(subject_path, &destination, &BTreeSet::new()) {
            Ok(stats) => {
                if stats.failed() > 0 {
                    warn!(
                        "Snapshot {:?} is partial: {} entries could not be copied",
                        destination,
                        stats.failed()
                    );
                }
                info!(
                    "Safety snapshot of {:?} written to {:?} ({} files)",
                    subject_path, destination, stats.files_copied
                );
                SnapshotOutcome::Created {
                    path: destination,
                    stats,
                }
            }
            Err(e) => {
                warn!("Snapshot of {:?} failed: {}", subject_path, e);
                if let Err(cleanup) = fs::remove_dir_all(&destination) {
                    debug!("Could not remove failed snapshot {:?}: {}", destination, cleanup);
                }
                SnapshotOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Create a fresh, uniquely named snapshot directory
    fn reserve_dir(&self, subject_name: &str, operation: SnapshotOperation) -> Result<PathBuf> {
        fs::create_dir_all(&self.safety_root)?;
        let stamp = Local::now().format(SNAPSHOT_TIME_FORMAT).to_string();
        let base = format!("{}_{}_{}", subject_name, operation, stamp);

        let mut candidate = self.safety_root.join(&base);
        let mut counter = 1;
        loop {
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    candidate = self.safety_root.join(format!("{}-{}", base, counter));
                    counter += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// All snapshots, newest first
    ///
    /// Directories whose names do not follow the snapshot pattern are still
    /// listed, without subject or operation.
    pub fn list(&self) -> Result<Vec<SnapshotInfo>> {
        let entries = match fs::read_dir(&self.safety_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let parsed = parse_snapshot_name(&name);
            let created_at = parsed
                .as_ref()
                .and_then(|p| Local.from_local_datetime(&p.taken_at).earliest())
                .map(|t| t.with_timezone(&Utc))
                .or_else(|| {
                    entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .ok()
                        .map(DateTime::<Utc>::from)
                });
            snapshots.push(SnapshotInfo {
                subject: parsed.as_ref().map(|p| p.subject.to_string()),
                operation: parsed.as_ref().map(|p| p.operation.to_string()),
                name,
                path: entry.path(),
                created_at,
            });
        }

        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.name.cmp(&a.name)));
        Ok(snapshots)
    }

    /// Remove every snapshot belonging to the backup `name`
    ///
    /// Best-effort: a snapshot that cannot be removed is recorded and the
    /// rest are still attempted. Returns how many were removed.
    #[instrument(skip(self))]
    pub fn delete_snapshots_for(&self, name: &str) -> (usize, Vec<FileFailure>) {
        let mut deleted = 0;
        let mut failures = Vec::new();

        let entries = match fs::read_dir(&self.safety_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (0, failures),
            Err(e) => {
                warn!("Cannot read safety root {:?}: {}", self.safety_root, e);
                failures.push(FileFailure::new(&self.safety_root, FileAction::Walk, e));
                return (0, failures);
            }
        };

        for entry in entries.flatten() {
            let dir_name = entry.file_name();
            if !belongs_to(&dir_name.to_string_lossy(), name) {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!("Removed snapshot {:?}", path);
                    deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to remove snapshot {:?}: {}", path, e);
                    failures.push(FileFailure::new(&path, FileAction::RemoveDir, e));
                }
            }
        }

        info!("Removed {} safety snapshot(s) for {}", deleted, name);
        (deleted, failures)
    }
}
