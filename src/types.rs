//! Core data types used throughout savesync
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Persisted state**: [`BackupRecord`] - one per registered backup
//! - **Plans and reports**: [`MirrorPlan`], [`MirrorReport`], [`CopyStats`] -
//!   what a filesystem pass intends to do and what it actually did
//! - **Safety snapshots**: [`SnapshotPolicy`], [`SnapshotOutcome`], [`SnapshotInfo`]
//! - **Ledger operations**: [`UpdateOptions`], [`RestoreOptions`] and their
//!   reports, plus [`OperationOutcome`] and [`BatchReport`] for front ends
//!
//! ## Examples
//!
//! ```rust
//! use savesync::types::{UpdateOptions, SnapshotPolicy};
//!
//! // Unattended update: snapshot failures are only warnings
//! let options = UpdateOptions::auto();
//! assert!(options.auto_confirm);
//! assert_eq!(options.snapshot_policy, SnapshotPolicy::BestEffort);
//! ```

use crate::error::Result;
use crate::metadata::BackupMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A registered backup
///
/// `backup_root` is always `root_backup_dir/<name>`; the catalog re-derives it
/// on load instead of trusting what is on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRecord {
    /// Normalized (trimmed, lowercased) name
    pub name: String,
    /// Trimmed spelling as first registered
    pub display_name: String,
    /// Absolute path of the live save folder
    pub source_path: PathBuf,
    /// Absolute path of the backup tree
    pub backup_root: PathBuf,
    /// When the backup was first created
    pub created_at: DateTime<Utc>,
    /// When the backup was last created or updated
    pub last_updated_at: DateTime<Utc>,
}

/// Kind of per-file action that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileAction {
    /// Reading a directory entry during a walk
    Walk,
    /// Copying a file or link
    Copy,
    /// Creating a directory
    CreateDir,
    /// Deleting a file or link
    Delete,
    /// Removing a directory (replace or prune)
    RemoveDir,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileAction::Walk => "walk",
            FileAction::Copy => "copy",
            FileAction::CreateDir => "create directory",
            FileAction::Delete => "delete",
            FileAction::RemoveDir => "remove directory",
        };
        f.write_str(s)
    }
}

/// A per-file failure that was logged and skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// Path the action was applied to
    pub path: PathBuf,
    /// What was being attempted
    pub action: FileAction,
    /// Error text
    pub error: String,
}

impl FileFailure {
    pub(crate) fn new(path: impl Into<PathBuf>, action: FileAction, error: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            action,
            error: error.to_string(),
        }
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to {} {}: {}", self.action, self.path.display(), self.error)
    }
}

/// Result of a recursive copy or copy-and-replace pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStats {
    /// Files and links copied
    pub files_copied: usize,
    /// Directories created at the destination
    pub dirs_created: usize,
    /// Existing destination directories removed before being replaced
    pub dirs_replaced: usize,
    /// Bytes written
    pub bytes_copied: u64,
    /// Entries that could not be copied
    pub failures: Vec<FileFailure>,
}

impl CopyStats {
    /// Number of entries that failed
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Fold another pass into this one
    pub fn merge(&mut self, other: CopyStats) {
        self.files_copied += other.files_copied;
        self.dirs_created += other.dirs_created;
        self.dirs_replaced += other.dirs_replaced;
        self.bytes_copied += other.bytes_copied;
        self.failures.extend(other.failures);
    }
}

/// Why a file is scheduled for copying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyReason {
    /// Absent from the target
    New,
    /// Source modification time is strictly newer than the target's
    Modified,
}

/// One file the mirror will copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCopy {
    /// Path relative to both roots
    pub path: PathBuf,
    /// Why it is copied
    pub reason: CopyReason,
}

/// What a mirror pass intends to do
///
/// Recomputed from scratch on every run; nothing about it is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorPlan {
    /// Source root
    pub source: PathBuf,
    /// Target root
    pub target: PathBuf,
    /// New or modified files, sorted by path
    pub to_copy: Vec<PlannedCopy>,
    /// Target-only files, sorted by path
    pub to_delete: Vec<PathBuf>,
    /// Files present on both sides and already up to date
    pub unchanged: usize,
    /// Entries that could not be read while planning
    pub walk_failures: Vec<FileFailure>,
}

impl MirrorPlan {
    /// Whether applying the plan would touch any file
    pub fn is_empty(&self) -> bool {
        self.to_copy.is_empty() && self.to_delete.is_empty()
    }

    /// Number of files new to the target
    pub fn new_files(&self) -> usize {
        self.to_copy.iter().filter(|c| c.reason == CopyReason::New).count()
    }

    /// Number of files that will be overwritten
    pub fn modified_files(&self) -> usize {
        self.to_copy.iter().filter(|c| c.reason == CopyReason::Modified).count()
    }
}

/// What a mirror pass did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorReport {
    /// Files copied to the target
    pub copied: usize,
    /// Target-only files deleted
    pub deleted: usize,
    /// Files skipped because they were already up to date
    pub unchanged: usize,
    /// Empty directories removed from the target
    pub dirs_pruned: usize,
    /// Bytes written
    pub bytes_copied: u64,
    /// Per-file failures (copy, delete, prune)
    pub failures: Vec<FileFailure>,
    /// Wall-clock duration
    pub duration_ms: u64,
}

impl MirrorReport {
    /// Number of files that failed to copy or delete
    pub fn failed(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f.action, FileAction::Copy | FileAction::Delete | FileAction::Walk))
            .count()
    }

    /// Whether the target changed at all
    pub fn has_changes(&self) -> bool {
        self.copied > 0 || self.deleted > 0 || self.dirs_pruned > 0
    }
}

impl fmt::Display for MirrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} copied, {} deleted, {} unchanged, {} failed",
            self.copied,
            self.deleted,
            self.unchanged,
            self.failed()
        )
    }
}

/// How a mutating operation reacts to a failed safety snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotPolicy {
    /// Report the failure and carry on
    #[default]
    BestEffort,
    /// Abort the operation before anything is mutated
    Required,
}

/// Outcome of a safety snapshot attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotOutcome {
    /// Snapshot directory written (possibly with per-file failures)
    Created {
        /// Snapshot directory
        path: PathBuf,
        /// Copy statistics
        stats: CopyStats,
    },
    /// The subject did not exist, so there was nothing to protect
    NothingToProtect,
    /// The snapshot could not be taken
    Failed {
        /// Failure description
        reason: String,
    },
}

impl SnapshotOutcome {
    /// Snapshot counts as successful (created or nothing to do)
    pub fn is_success(&self) -> bool {
        !matches!(self, SnapshotOutcome::Failed { .. })
    }

    /// Snapshot directory, when one was written
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            SnapshotOutcome::Created { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotOutcome::Created { path, stats } if stats.failed() > 0 => write!(
                f,
                "safety snapshot at {} ({} files could not be copied)",
                path.display(),
                stats.failed()
            ),
            SnapshotOutcome::Created { path, .. } => {
                write!(f, "safety snapshot at {}", path.display())
            }
            SnapshotOutcome::NothingToProtect => f.write_str("no safety snapshot needed"),
            SnapshotOutcome::Failed { reason } => write!(f, "safety snapshot failed: {}", reason),
        }
    }
}

/// A safety snapshot found under the safety root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Directory name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Subject part of the name, when the name is well-formed
    pub subject: Option<String>,
    /// Operation part of the name, when the name is well-formed
    pub operation: Option<String>,
    /// Directory modification time
    pub created_at: Option<DateTime<Utc>>,
}

/// Options for [`BackupLedger::update`](crate::BackupLedger::update)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Unattended mode: overrides are ignored and snapshots are best-effort
    pub auto_confirm: bool,
    /// New source path confirmed interactively
    pub source_override: Option<PathBuf>,
    /// Reaction to a failed safety snapshot (interactive mode only)
    pub snapshot_policy: SnapshotPolicy,
}

impl UpdateOptions {
    /// Options used by batch operations
    pub fn auto() -> Self {
        Self {
            auto_confirm: true,
            ..Default::default()
        }
    }
}

/// Options for [`BackupLedger::restore`](crate::BackupLedger::restore)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Unattended mode: overrides are ignored and snapshots are best-effort
    pub auto_confirm: bool,
    /// Restore somewhere other than the recorded source path
    pub destination_override: Option<PathBuf>,
    /// Reaction to a failed safety snapshot (interactive mode only)
    pub snapshot_policy: SnapshotPolicy,
}

impl RestoreOptions {
    /// Options used by batch operations
    pub fn auto() -> Self {
        Self {
            auto_confirm: true,
            ..Default::default()
        }
    }
}

/// Result of creating a backup
#[derive(Debug, Clone)]
pub struct CreateReport {
    /// Newly registered record
    pub record: BackupRecord,
    /// Copy statistics
    pub stats: CopyStats,
}

impl fmt::Display for CreateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backup created for {} ({} files",
            self.record.display_name, self.stats.files_copied
        )?;
        if self.stats.failed() > 0 {
            write!(f, ", {} failed", self.stats.failed())?;
        }
        f.write_str(")")
    }
}

/// Result of updating a backup
#[derive(Debug, Clone)]
pub struct UpdateReport {
    /// Record after the update
    pub record: BackupRecord,
    /// Snapshot of the previous backup tree
    pub snapshot: SnapshotOutcome,
    /// Mirror statistics
    pub mirror: MirrorReport,
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backup updated for {}: {}; {}",
            self.record.display_name, self.mirror, self.snapshot
        )
    }
}

/// Result of restoring a backup
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// Restored backup
    pub record: BackupRecord,
    /// Where files were written
    pub destination: PathBuf,
    /// Snapshot of the destination before it was overwritten
    pub snapshot: SnapshotOutcome,
    /// Copy statistics
    pub stats: CopyStats,
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backup restored for {} to {} ({} files, {} failed); {}",
            self.record.display_name,
            self.destination.display(),
            self.stats.files_copied,
            self.stats.failed(),
            self.snapshot
        )
    }
}

/// Result of deleting a backup
#[derive(Debug, Clone)]
pub struct DeleteReport {
    /// Record that was removed
    pub record: BackupRecord,
    /// Whether a backup tree existed and was removed
    pub tree_removed: bool,
    /// Safety snapshots removed by the cascade
    pub snapshots_deleted: usize,
    /// Snapshots that could not be removed
    pub snapshot_failures: Vec<FileFailure>,
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Deleted backup {} and {} safety snapshot(s)",
            self.record.display_name, self.snapshots_deleted
        )
    }
}

/// A backup as shown by `list_backups`
#[derive(Debug, Clone)]
pub struct BackupSummary {
    /// Catalog record
    pub record: BackupRecord,
    /// Parsed metadata file, when present and readable
    pub metadata: Option<BackupMetadata>,
}

/// `(success, message)` pair handed to front ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Whether the operation completed
    pub success: bool,
    /// Human readable summary or error
    pub message: String,
}

impl OperationOutcome {
    /// Successful outcome
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Failed outcome
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Collapse an operation result into an outcome
    pub fn from_result<T: fmt::Display>(result: &Result<T>) -> Self {
        match result {
            Ok(report) => Self::ok(report.to_string()),
            Err(e) => Self::failed(e.user_message()),
        }
    }
}

/// One entry of a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Backup name
    pub name: String,
    /// What happened to it
    pub outcome: OperationOutcome,
}

/// Aggregate result of `update_all` / `restore_all`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Per-name results in processing order
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    /// Number of names processed
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Number of names that succeeded
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.success).count()
    }

    /// Number of names that failed
    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Outcome for a given name
    pub fn get(&self, name: &str) -> Option<&OperationOutcome> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.outcome)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} succeeded, {} failed",
            self.total(),
            self.succeeded(),
            self.failed()
        )
    }
}
