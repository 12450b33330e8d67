//! Single-file archive container for remote transfer
//!
//! A remote backup is one file, so the tree is packed into a small container:
//!
//! ```text
//! +--------+---------+----------------------------------------------+
//! | "SSAR" | version | lz4 (size-prepended) of bincode ArchiveBody   |
//! | 4 B    | 1 B     |                                              |
//! +--------+---------+----------------------------------------------+
//! ```
//!
//! The body holds every entry (directory, file or symlink) with its relative
//! path, permission bits and modification time. Unpacking refuses entries
//! whose paths are absolute or climb out of the destination.

use crate::error::{Result, SaveSyncError};
use crate::types::{FileAction, FileFailure};
use crate::utils;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

const MAGIC: &[u8; 4] = b"SSAR";
const FORMAT_VERSION: u8 = 1;

/// File extension used for archives
pub const ARCHIVE_EXTENSION: &str = "ssar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum EntryKind {
    Dir,
    File,
    Symlink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveEntry {
    /// Relative path with `/` separators
    path: String,
    kind: EntryKind,
    mode: u32,
    modified_secs: i64,
    modified_nanos: u32,
    data: Vec<u8>,
    link_target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveBody {
    created_at: DateTime<Utc>,
    entries: Vec<ArchiveEntry>,
}

/// Counts from packing or unpacking an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub dirs: usize,
    pub symlinks: usize,
    /// Uncompressed size of all file contents
    pub total_bytes: u64,
    /// Size of the archive file
    pub archive_bytes: u64,
    /// Entries skipped because they could not be read or written
    pub failures: Vec<FileFailure>,
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_entry(entry: &walkdir::DirEntry, relative: &Path) -> Result<ArchiveEntry> {
    let metadata = fs::symlink_metadata(entry.path())?;
    let mtime = FileTime::from_last_modification_time(&metadata);
    let mut archived = ArchiveEntry {
        path: relative_string(relative),
        kind: EntryKind::File,
        mode: utils::get_permissions(&metadata),
        modified_secs: mtime.unix_seconds(),
        modified_nanos: mtime.nanoseconds(),
        data: Vec::new(),
        link_target: None,
    };

    if metadata.file_type().is_symlink() {
        archived.kind = EntryKind::Symlink;
        archived.link_target = Some(utils::read_symlink(entry.path())?.to_string_lossy().into_owned());
    } else if metadata.is_dir() {
        archived.kind = EntryKind::Dir;
    } else {
        archived.data = fs::read(entry.path())?;
    }
    Ok(archived)
}

/// Pack the contents of `src` into the archive file `dest_file`
///
/// Entries that cannot be read are logged, counted and left out.
#[instrument]
pub fn pack_directory(src: &Path, dest_file: &Path) -> Result<ArchiveStats> {
    utils::require_dir(src)?;
    let mut stats = ArchiveStats::default();
    let mut entries = Vec::new();

    for entry in WalkDir::new(src).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
                warn!("Failed to read {:?}: {}", path, e);
                stats.failures.push(FileFailure::new(path, FileAction::Walk, e));
                continue;
            }
        };
        let relative = utils::make_relative(entry.path(), src)?;

        match read_entry(&entry, &relative) {
            Ok(archived) => {
                match archived.kind {
                    EntryKind::Dir => stats.dirs += 1,
                    EntryKind::Symlink => stats.symlinks += 1,
                    EntryKind::File => {
                        stats.files += 1;
                        stats.total_bytes += archived.data.len() as u64;
                    }
                }
                entries.push(archived);
            }
            Err(e) => {
                warn!("Failed to archive {:?}: {}", entry.path(), e);
                stats.failures.push(FileFailure::new(entry.path(), FileAction::Walk, e));
            }
        }
    }

    let body = ArchiveBody {
        created_at: Utc::now(),
        entries,
    };
    let encoded = bincode::serde::encode_to_vec(&body, bincode::config::standard())?;
    let compressed = compress_prepend_size(&encoded);

    let mut bytes = Vec::with_capacity(MAGIC.len() + 1 + compressed.len());
    bytes.extend_from_slice(MAGIC);
    bytes.push(FORMAT_VERSION);
    bytes.extend_from_slice(&compressed);

    if let Some(parent) = dest_file.parent() {
        fs::create_dir_all(parent)?;
    }
    utils::atomic_write(dest_file, &bytes)?;
    stats.archive_bytes = bytes.len() as u64;

    debug!(
        "Packed {} files ({}) into {} archive",
        stats.files,
        utils::format_bytes(stats.total_bytes),
        utils::format_bytes(stats.archive_bytes)
    );
    Ok(stats)
}

fn decode(bytes: &[u8]) -> Result<ArchiveBody> {
    if bytes.len() < MAGIC.len() + 1 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(SaveSyncError::archive("not a savesync archive"));
    }
    let version = bytes[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(SaveSyncError::archive(format!(
            "unsupported archive version {}",
            version
        )));
    }
    let decompressed = decompress_size_prepended(&bytes[MAGIC.len() + 1..])
        .map_err(|e| SaveSyncError::archive(format!("corrupt archive: {}", e)))?;
    let (body, _) = bincode::serde::decode_from_slice(&decompressed, bincode::config::standard())?;
    Ok(body)
}

/// Map an archived path onto `dest`, refusing anything that escapes it
fn safe_join(dest: &Path, archived: &str) -> Result<PathBuf> {
    let relative = Path::new(archived);
    if archived.is_empty()
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(SaveSyncError::path_invalid(
            relative,
            "archive entry escapes the destination",
        ));
    }
    Ok(dest.join(relative))
}

fn write_entry(entry: &ArchiveEntry, target: &Path) -> Result<()> {
    match entry.kind {
        EntryKind::Dir => {
            fs::create_dir_all(target)?;
        }
        EntryKind::File => {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, &entry.data)?;
            utils::set_permissions(target, entry.mode)?;
            let mtime = FileTime::from_unix_time(entry.modified_secs, entry.modified_nanos);
            filetime::set_file_mtime(target, mtime)?;
        }
        EntryKind::Symlink => {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let link_target = entry
                .link_target
                .as_deref()
                .ok_or_else(|| SaveSyncError::archive("symlink entry without a target"))?;
            if fs::symlink_metadata(target).is_ok() {
                fs::remove_file(target)?;
            }
            utils::create_symlink(Path::new(link_target), target)?;
        }
    }
    Ok(())
}

/// Unpack archive bytes into `dest_dir`
///
/// The whole archive is validated before anything is written: a malformed
/// container or an entry path leaving `dest_dir` fails without side effects.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn unpack_archive(bytes: &[u8], dest_dir: &Path) -> Result<ArchiveStats> {
    let body = decode(bytes)?;
    let targets = body
        .entries
        .iter()
        .map(|entry| safe_join(dest_dir, &entry.path))
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(dest_dir)?;
    let mut stats = ArchiveStats {
        archive_bytes: bytes.len() as u64,
        ..Default::default()
    };

    for (entry, target) in body.entries.iter().zip(&targets) {
        match write_entry(entry, target) {
            Ok(()) => match entry.kind {
                EntryKind::Dir => stats.dirs += 1,
                EntryKind::Symlink => stats.symlinks += 1,
                EntryKind::File => {
                    stats.files += 1;
                    stats.total_bytes += entry.data.len() as u64;
                }
            },
            Err(e) => {
                warn!("Failed to extract {:?}: {}", target, e);
                stats.failures.push(FileFailure::new(target, FileAction::Copy, e));
            }
        }
    }

    debug!("Unpacked {} files into {:?}", stats.files, dest_dir);
    Ok(stats)
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of a byte slice
pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
