//! Backup name normalization
//!
//! Every component past the catalog boundary works with [`BackupName`], never
//! with raw user input. Two spellings that differ only in surrounding
//! whitespace or letter case are the same logical backup.

use crate::error::{Result, SaveSyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters that may not appear in a backup name
pub const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Directory names under the backup root that belong to the tool itself
const RESERVED_NAMES: &[&str] = &["logs"];

/// A validated, normalized backup name
///
/// The normalized form (trimmed, lowercased) doubles as the name of the
/// backup directory under the root, so it can never contain path separators.
///
/// # Examples
///
/// ```rust
/// use savesync::BackupName;
///
/// let a = BackupName::parse("Zelda ").unwrap();
/// let b = BackupName::parse(" ZELDA").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "zelda");
/// assert_eq!(a.display_name(), "Zelda");
///
/// assert!(BackupName::parse("bad/name").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupName {
    normalized: String,
    display: String,
}

impl BackupName {
    /// Validate and normalize a raw name
    pub fn parse(raw: &str) -> Result<Self> {
        let display = raw.trim();

        if display.is_empty() {
            return Err(SaveSyncError::invalid_name(raw, "name is empty"));
        }
        if let Some(c) = display.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
            return Err(SaveSyncError::invalid_name(
                raw,
                format!("contains forbidden character '{}'", c),
            ));
        }
        if display.chars().any(|c| c.is_control()) {
            return Err(SaveSyncError::invalid_name(raw, "contains control characters"));
        }
        if display == "." || display == ".." {
            return Err(SaveSyncError::invalid_name(raw, "name is a relative path component"));
        }

        let normalized = display.to_lowercase();
        if RESERVED_NAMES.contains(&normalized.as_str()) {
            return Err(SaveSyncError::invalid_name(raw, "name is reserved"));
        }

        Ok(Self {
            normalized,
            display: display.to_string(),
        })
    }

    /// Normalized form used for lookups and directory names
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Trimmed spelling as the user first typed it
    pub fn display_name(&self) -> &str {
        &self.display
    }

    /// Normalize without keeping the display spelling
    pub fn normalize(raw: &str) -> Result<String> {
        Self::parse(raw).map(|n| n.normalized)
    }
}

impl PartialEq for BackupName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for BackupName {}

impl std::hash::Hash for BackupName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Display for BackupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl AsRef<str> for BackupName {
    fn as_ref(&self) -> &str {
        &self.normalized
    }
}
