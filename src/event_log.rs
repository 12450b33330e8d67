//! Append-only audit log of backup operations
//!
//! The ledger reports every completed operation to an [`EventLog`]. The
//! default [`FileEventLog`] writes one line per event to
//! `root/logs/backup_log.txt`:
//!
//! ```text
//! [2026-10-18 14:03:55] CREATE: zelda | Path: /home/me/saves/zelda
//! [2026-10-18 14:10:02] UPDATE_ALL: ALL | Path: multiple
//! ```
//!
//! This log is for the user, not for diagnostics; `tracing` never writes to
//! it. Failing to record an event never fails the operation.

use crate::error::Result;
use crate::metadata::DISPLAY_TIME_FORMAT;
use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Kind of audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogAction {
    Create,
    Update,
    Restore,
    PermanentDelete,
    UpdateAll,
    RestoreAll,
    RemoteUpload,
    RemoteRestore,
    RemoteDelete,
}

impl LogAction {
    /// Label written to the log
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Create => "CREATE",
            LogAction::Update => "UPDATE",
            LogAction::Restore => "RESTORE",
            LogAction::PermanentDelete => "PERMANENT_DELETE",
            LogAction::UpdateAll => "UPDATE_ALL",
            LogAction::RestoreAll => "RESTORE_ALL",
            LogAction::RemoteUpload => "REMOTE_UPLOAD",
            LogAction::RemoteRestore => "REMOTE_RESTORE",
            LogAction::RemoteDelete => "REMOTE_DELETE",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Local time the event was recorded
    pub timestamp: NaiveDateTime,
    pub action: LogAction,
    /// Backup name, or `ALL` for batch operations
    pub name: String,
    /// Path involved, or `multiple` for batch operations
    pub path: String,
}

impl LogEvent {
    /// Event stamped with the current local time
    pub fn new(action: LogAction, name: impl Into<String>, path: impl fmt::Display) -> Self {
        Self {
            timestamp: Local::now().naive_local(),
            action,
            name: name.into(),
            path: path.to_string(),
        }
    }

    /// Aggregate event for a batch operation
    pub fn batch(action: LogAction) -> Self {
        Self::new(action, "ALL", "multiple")
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} | Path: {}",
            self.timestamp.format(DISPLAY_TIME_FORMAT),
            self.action,
            self.name,
            self.path
        )
    }
}

/// Destination for audit events
pub trait EventLog: Send + Sync + fmt::Debug {
    /// Append one event
    fn record(&self, event: &LogEvent) -> Result<()>;

    /// Up to `limit` most recent lines, newest first
    fn recent(&self, limit: usize) -> Result<Vec<String>>;
}

/// Line-oriented log file
#[derive(Debug)]
pub struct FileEventLog {
    path: PathBuf,
    // Serializes appends from threads sharing one ledger
    write_lock: Mutex<()>,
}

impl FileEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventLog for FileEventLog {
    fn record(&self, event: &LogEvent) -> Result<()> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", event)?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<String>> {
        let content = match fs::read(&self.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .take(limit)
            .map(str::to_string)
            .collect())
    }
}

/// In-process log, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Actions recorded so far, oldest first
    pub fn actions(&self) -> Vec<LogAction> {
        self.events.lock().iter().map(|e| e.action).collect()
    }
}

impl EventLog for MemoryEventLog {
    fn record(&self, event: &LogEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .events
            .lock()
            .iter()
            .rev()
            .take(limit)
            .map(ToString::to_string)
            .collect())
    }
}
