//! Per-backup metadata file
//!
//! Each backup directory carries one small text file (`README.txt` by
//! default) so a human browsing the backup root can tell where a tree came
//! from:
//!
//! ```text
//! Game Title: Hollow Knight
//! Original Save Path: /home/me/.config/unity3d/Team Cherry/Hollow Knight
//! Backup Date: 2026-10-18 14:03:55
//! ```
//!
//! The file is excluded from mirror diffing and from restores.

use crate::error::Result;
use crate::utils;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TITLE_KEY: &str = "Game Title";
const SOURCE_KEY: &str = "Original Save Path";
const DATE_KEY: &str = "Backup Date";

/// Timestamp format used in the metadata file and the audit log
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parsed contents of a metadata file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Human readable title
    pub game_title: String,
    /// Path the backup was taken from
    pub original_save_path: PathBuf,
    /// Local time of the last create or update
    pub backup_date: Option<NaiveDateTime>,
}

impl BackupMetadata {
    /// Metadata stamped with the current local time
    pub fn now(game_title: impl Into<String>, original_save_path: impl Into<PathBuf>) -> Self {
        Self {
            game_title: game_title.into(),
            original_save_path: original_save_path.into(),
            backup_date: Some(Local::now().naive_local()),
        }
    }

    /// Render as the on-disk text format
    pub fn render(&self) -> String {
        let date = self
            .backup_date
            .map(|d| d.format(DISPLAY_TIME_FORMAT).to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        format!(
            "{}: {}\n{}: {}\n{}: {}\n",
            TITLE_KEY,
            self.game_title,
            SOURCE_KEY,
            self.original_save_path.display(),
            DATE_KEY,
            date
        )
    }

    /// Parse the text format
    ///
    /// Unknown lines are ignored. Returns `None` when no source path line is
    /// present, since such a file cannot drive an update or restore.
    pub fn parse(content: &str) -> Option<Self> {
        let mut title = None;
        let mut source = None;
        let mut date = None;

        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                TITLE_KEY => title = Some(value.to_string()),
                SOURCE_KEY if !value.is_empty() => source = Some(PathBuf::from(value)),
                DATE_KEY => date = NaiveDateTime::parse_from_str(value, DISPLAY_TIME_FORMAT).ok(),
                _ => {}
            }
        }

        source.map(|original_save_path| Self {
            game_title: title.unwrap_or_default(),
            original_save_path,
            backup_date: date,
        })
    }

    /// Write the metadata file into `backup_root` atomically
    pub fn write(&self, backup_root: &Path, file_name: &str) -> Result<()> {
        let path = backup_root.join(file_name);
        utils::atomic_write(&path, self.render().as_bytes())?;
        debug!("Wrote metadata file {:?}", path);
        Ok(())
    }

    /// Read the metadata file from `backup_root`
    ///
    /// A missing file yields `Ok(None)`; an unreadable one is an error.
    pub fn read(backup_root: &Path, file_name: &str) -> Result<Option<Self>> {
        let path = backup_root.join(file_name);
        let content = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parsed = Self::parse(&content);
        if parsed.is_none() {
            warn!("Metadata file {:?} has no source path line", path);
        }
        Ok(parsed)
    }
}

impl fmt::Display for BackupMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
