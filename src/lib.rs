//! # SaveSync - Backup, mirror and restore game save folders
//!
//! A library for keeping named backups of live directory trees (typically
//! game save folders), bringing them up to date with a one-way mirror and
//! restoring them, with a safety snapshot taken before every destructive
//! step.
//!
//! ## Overview
//!
//! SaveSync lets you:
//! - Register a save folder under a name and copy it in full
//! - Update the backup by mirroring the live folder into it
//! - Restore a backup over the live folder without deleting unrelated files
//! - Push a backup to a remote blob store as one archive and pull it back
//! - Audit every operation in an append-only log
//!
//! ## Architecture
//!
//! - **PathCatalog**: maps normalized names to their source and backup
//!   directories, persisted as `catalog.json`
//! - **SafetySnapshotter**: copies a tree aside before it is overwritten
//! - **DirectoryMirror**: the one-way diff-and-copy with orphan deletion
//! - **BackupLedger**: the lifecycle of named backups, built on the above
//! - **EventLog** and **RemoteArchiveTransfer**: collaborators at the edges
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use savesync::{BackupLedger, RestoreOptions, SaveSyncConfig, UpdateOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ledger = BackupLedger::open(SaveSyncConfig::new("./save-backups"))?;
//!
//! // First backup: full copy
//! let created = ledger.create("Hollow Knight", Path::new("/home/me/saves/hk"))?;
//! println!("{}", created);
//!
//! // Later: mirror the live folder into the backup
//! let updated = ledger.update("hollow knight", &UpdateOptions::auto())?;
//! println!("{} copied, {} deleted", updated.mirror.copied, updated.mirror.deleted);
//!
//! // Put the saves back
//! let restored = ledger.restore("hollow knight", &RestoreOptions::auto())?;
//! println!("{}", restored);
//! # Ok(())
//! # }
//! ```
//!
//! ## Dry Runs
//!
//! ```rust,no_run
//! # use savesync::{BackupLedger, SaveSyncConfig};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let ledger = BackupLedger::open(SaveSyncConfig::new("./save-backups"))?;
//! let plan = ledger.plan_update("hollow knight", None)?;
//! for copy in &plan.to_copy {
//!     println!("copy   {} ({:?})", copy.path.display(), copy.reason);
//! }
//! for path in &plan.to_delete {
//!     println!("delete {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Names
//!
//! Names are trimmed and lowercased before use, so `"Zelda "`, `"zelda"` and
//! `" ZELDA"` are one backup. The normalized name is also the backup's
//! directory under the root.
//!
//! ### Mirror vs. restore
//!
//! An update mirrors: files missing from the live folder are deleted from
//! the backup. A restore copies and replaces: files in the live folder that
//! the backup knows nothing about are left alone.
//!
//! ### Staleness
//!
//! Only modification times are compared, with a strict `>`. An edit made
//! within the same second as the previous copy is not detected.
//!
//! ### Safety snapshots
//!
//! Updates snapshot the backup tree and restores snapshot the live folder,
//! under `root/logs/safety_backups`. They are only removed when their
//! backup is deleted.
//!
//! ## Concurrency
//!
//! Everything runs synchronously on the calling thread. There is no locking
//! across processes: two instances working on the same root can race.
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SaveSyncError>`. Per-file failures are
//! never errors; they are counted in the operation's report. Use
//! [`OperationOutcome::from_result`] to turn any result into the
//! `(success, message)` pair a front end displays.
//!
//! ## Module Organization
//!
//! - [`ledger`]: backup lifecycle and builder
//! - [`catalog`]: persisted name registry
//! - [`mirror`]: one-way mirror
//! - [`snapshot`]: safety snapshots
//! - [`event_log`]: audit log
//! - [`archive`]: single-file archive container
//! - [`remote`]: blob stores and cloud backups
//! - [`config`], [`name`], [`metadata`], [`types`], [`error`]

// Public API modules
pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event_log;
pub mod ledger;
pub mod metadata;
pub mod mirror;
pub mod name;
pub mod remote;
pub mod snapshot;
pub mod types;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use catalog::PathCatalog;
pub use config::SaveSyncConfig;
pub use error::{Result, SaveSyncError};
pub use event_log::{EventLog, FileEventLog, LogAction, LogEvent, MemoryEventLog};
pub use ledger::{BackupLedger, BackupLedgerBuilder};
pub use metadata::BackupMetadata;
pub use mirror::DirectoryMirror;
pub use name::BackupName;
pub use snapshot::{SafetySnapshotter, SnapshotOperation};
pub use types::*;
pub use utils::format_bytes;
