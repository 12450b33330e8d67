//! Filesystem helpers for savesync
//!
//! ## Categories of Utilities
//!
//! ### Copying
//! - [`copy_entry`]: copy one file or symlink, preserving modification time
//!   and permission bits
//! - [`copy_tree`]: full recursive copy with per-entry failure tolerance
//! - [`copy_and_replace`]: restore-style copy that replaces top-level
//!   directories but never deletes unrelated destination files
//!
//! ### Metadata
//! - Modification times and Unix-style permissions (cross-platform)
//! - Symbolic link creation and reading
//!
//! ### Paths and files
//! - Relative paths, atomic writes, empty-directory removal
//! - Human-readable byte counts
//!
//! ## Error Handling
//!
//! Single-entry helpers return `Result` and let the caller decide. The tree
//! helpers only fail when the *root* is unusable; anything below it is
//! recorded in [`CopyStats::failures`] and skipped, so one locked save file
//! never blocks the other files.

use crate::error::{Result, SaveSyncError};
use crate::types::{CopyStats, FileAction, FileFailure};
use filetime::FileTime;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Get Unix permissions from metadata
#[cfg(unix)]
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

/// Get permissions from metadata (Windows implementation)
#[cfg(windows)]
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    let mut mode = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    if metadata.is_dir() {
        mode |= 0o111;
    }
    mode
}

/// Set Unix permissions
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Set permissions (Windows implementation)
///
/// Only the read-only attribute can be expressed, derived from the owner
/// write bit.
#[cfg(windows)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Modification time of a path, without following symlinks
#[cfg(test)]
pub fn modified_time(path: &Path) -> Result<std::time::SystemTime> {
    Ok(fs::symlink_metadata(path)?.modified()?)
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

/// Create a symlink (Windows)
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    if target.is_dir() {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}

/// Read symlink target
pub fn read_symlink(path: &Path) -> Result<PathBuf> {
    Ok(fs::read_link(path)?)
}

/// Copy a single file or symlink from `src` to `dst`
///
/// Parent directories are created as needed and an existing destination is
/// overwritten. Regular files keep their modification time and permission
/// bits; symlinks are recreated as links pointing at the same target.
///
/// Returns the number of bytes written (0 for symlinks).
pub fn copy_entry(src: &Path, dst: &Path) -> Result<u64> {
    let metadata = fs::symlink_metadata(src)?;

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    if metadata.file_type().is_symlink() {
        let target = read_symlink(src)?;
        if fs::symlink_metadata(dst).is_ok() {
            fs::remove_file(dst)?;
        }
        create_symlink(&target, dst)?;
        let mtime = FileTime::from_last_modification_time(&metadata);
        filetime::set_symlink_file_times(dst, mtime, mtime)?;
        trace!("Copied symlink {:?} -> {:?}", dst, target);
        return Ok(0);
    }

    // fs::copy would write through a stale symlink or fail on a read-only file
    if let Ok(existing) = fs::symlink_metadata(dst) {
        if existing.file_type().is_symlink() || existing.permissions().readonly() {
            fs::remove_file(dst)?;
        }
    }

    let bytes = fs::copy(src, dst)?;
    set_permissions(dst, get_permissions(&metadata))?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_times(dst, atime, mtime)?;
    trace!("Copied {:?} -> {:?} ({} bytes)", src, dst, bytes);
    Ok(bytes)
}

/// Check that `path` exists and is a directory
pub fn require_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(SaveSyncError::path_invalid(path, "not a directory")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SaveSyncError::SourceNotFound(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Recursively copy the contents of `src` into `dst`
///
/// `dst` is created if missing; existing files are overwritten. Entries
/// named in `skip_names` are not copied, at any depth. When `dst` lies
/// inside `src` it is never walked. Only a missing or unusable `src`, or a
/// `dst` that is `src` itself, is an error. Entries that cannot be read or
/// written are logged, recorded in the returned stats and skipped.
///
/// # Example
///
/// ```rust,ignore
/// let skip = BTreeSet::from(["README.txt".to_string()]);
/// let stats = copy_tree(Path::new("/saves/foo"), Path::new("/backups/foo"), &skip)?;
/// println!("{} files, {} failed", stats.files_copied, stats.failed());
/// ```
pub fn copy_tree(src: &Path, dst: &Path, skip_names: &BTreeSet<String>) -> Result<CopyStats> {
    require_dir(src)?;
    let resolved_src = resolve_path(src);
    let resolved_dst = resolve_path(dst);
    if resolved_dst == resolved_src {
        return Err(SaveSyncError::path_invalid(dst, "cannot copy a directory into itself"));
    }
    let nested_dst = resolved_dst
        .strip_prefix(&resolved_src)
        .ok()
        .map(|rel| src.join(rel));

    let mut stats = CopyStats::default();

    if !dst.exists() {
        fs::create_dir_all(dst)?;
        stats.dirs_created += 1;
    }

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if nested_dst.as_deref() == Some(entry.path()) {
                debug!("Not descending into copy destination {:?}", entry.path());
                return false;
            }
            !skip_names.contains(&*entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
                warn!("Failed to read {:?}: {}", path, e);
                stats.failures.push(FileFailure::new(path, FileAction::Walk, e));
                continue;
            }
        };

        let relative = make_relative(entry.path(), src)?;
        let target = dst.join(&relative);

        if entry.file_type().is_dir() {
            if target.is_dir() {
                continue;
            }
            match fs::create_dir_all(&target) {
                Ok(()) => stats.dirs_created += 1,
                Err(e) => {
                    warn!("Failed to create directory {:?}: {}", target, e);
                    stats.failures.push(FileFailure::new(&target, FileAction::CreateDir, e));
                }
            }
            continue;
        }

        match copy_entry(entry.path(), &target) {
            Ok(bytes) => {
                stats.files_copied += 1;
                stats.bytes_copied += bytes;
            }
            Err(e) => {
                warn!("Failed to copy {:?}: {}", entry.path(), e);
                stats.failures.push(FileFailure::new(entry.path(), FileAction::Copy, e));
            }
        }
    }

    Ok(stats)
}

/// Copy every top-level entry of `src` into `dst`, replacing what is there
///
/// For each entry of `src` whose name is not in `skip_names`:
/// - a directory replaces the destination directory of the same name (the
///   old one is removed first, then the entry is copied recursively);
/// - a file or symlink overwrites the destination entry.
///
/// Destination entries without a counterpart in `src` are left untouched.
pub fn copy_and_replace(src: &Path, dst: &Path, skip_names: &BTreeSet<String>) -> Result<CopyStats> {
    require_dir(src)?;
    fs::create_dir_all(dst)?;
    let mut stats = CopyStats::default();

    let mut entries: Vec<_> = fs::read_dir(src)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if skip_names.contains(name.to_string_lossy().as_ref()) {
            continue;
        }

        let from = entry.path();
        let to = dst.join(&name);
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to read {:?}: {}", from, e);
                stats.failures.push(FileFailure::new(&from, FileAction::Walk, e));
                continue;
            }
        };

        if file_type.is_dir() {
            if let Err(e) = remove_existing(&to) {
                warn!("Failed to clear {:?} before restore: {}", to, e);
                stats.failures.push(FileFailure::new(&to, FileAction::RemoveDir, e));
                continue;
            }
            match copy_tree(&from, &to, skip_names) {
                Ok(sub) => {
                    stats.dirs_replaced += 1;
                    stats.merge(sub);
                }
                Err(e) => {
                    warn!("Failed to copy {:?}: {}", from, e);
                    stats.failures.push(FileFailure::new(&from, FileAction::Copy, e));
                }
            }
        } else {
            if to.is_dir() && !is_symlink(&to) {
                if let Err(e) = fs::remove_dir_all(&to) {
                    warn!("Failed to clear {:?} before restore: {}", to, e);
                    stats.failures.push(FileFailure::new(&to, FileAction::RemoveDir, e));
                    continue;
                }
            }
            match copy_entry(&from, &to) {
                Ok(bytes) => {
                    stats.files_copied += 1;
                    stats.bytes_copied += bytes;
                }
                Err(e) => {
                    warn!("Failed to restore {:?}: {}", from, e);
                    stats.failures.push(FileFailure::new(&from, FileAction::Copy, e));
                }
            }
        }
    }

    Ok(stats)
}

/// Absolute form of `path` with symlinks resolved as far as it exists
///
/// The missing tail, if any, is appended unchanged.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Whether `path` is `ancestor` or lies somewhere below it
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    resolve_path(path).starts_with(resolve_path(ancestor))
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Remove whatever sits at `path` (directory tree, file or link)
fn remove_existing(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove directory if empty
pub fn remove_dir_if_empty(path: &Path) -> Result<bool> {
    if path.is_dir() && !is_symlink(path) && fs::read_dir(path)?.next().is_none() {
        fs::remove_dir(path)?;
        trace!("Removed empty directory: {:?}", path);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so symlinked paths keep their spelling, then
/// falls back to canonicalising both sides.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            SaveSyncError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Turn user input into an absolute path
///
/// Surrounding whitespace and double quotes (as pasted from a file manager)
/// are stripped.
pub fn clean_user_path(raw: &Path) -> Result<PathBuf> {
    let text = raw.to_string_lossy();
    let trimmed = text.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Err(SaveSyncError::path_invalid(raw, "path is empty"));
    }
    Ok(std::path::absolute(trimmed)?)
}

/// Format bytes in human-readable form
///
/// ```rust,ignore
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file then rename)
///
/// The temporary file lives next to the target so the rename never crosses
/// filesystems. Either the old or the new content is visible, never a mix.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SaveSyncError::Io(e.error))?;
    Ok(())
}
