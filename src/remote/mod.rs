//! Remote blob stores and cloud backups
//!
//! The tool never talks to a cloud provider directly. Everything goes through
//! [`RemoteArchiveTransfer`], a folder-and-file store with six operations.
//! Two implementations ship with the crate:
//!
//! - [`MemoryBlobStore`]: in-process, for embedding and tests
//! - [`LocalFolderStore`]: a plain directory, such as a synced cloud-drive
//!   mount
//!
//! [`RemoteBackups`] builds the backup flow on top of any store:
//!
//! ```text
//! <container>/<name>/<YYYY-MM-DD_HH-MM-SS>/
//!     <name>.ssar
//!     manifest.json
//! ```
//!
//! Transport failures surface as [`SaveSyncError::Remote`](crate::SaveSyncError::Remote)
//! and are never retried.

mod local;
mod memory;
mod sync;

pub use local::LocalFolderStore;
pub use memory::MemoryBlobStore;
pub use sync::{PullReport, PushReport, RemoteBackup, RemoteBackups, RemoteManifest};

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Opaque identifier of a remote folder or file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId(s.to_string())
    }
}

/// Kind of remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteKind {
    Folder,
    File,
}

/// One child of a remote folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: RemoteId,
    pub name: String,
    pub kind: RemoteKind,
    pub created_at: DateTime<Utc>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == RemoteKind::Folder
    }
}

/// Folder-and-file blob store
pub trait RemoteArchiveTransfer: Send + Sync {
    /// Top-level folder named `label`, created if missing
    fn find_or_create_container(&self, label: &str) -> Result<RemoteId>;

    /// Folder `name` under `parent`, created if missing
    fn create_subfolder(&self, parent: &RemoteId, name: &str) -> Result<RemoteId>;

    /// Upload a local file into `folder` under its own file name
    ///
    /// A file with the same name in that folder is replaced.
    fn upload_archive(&self, folder: &RemoteId, local_path: &Path) -> Result<RemoteId>;

    /// Direct children of `folder`
    fn list_children(&self, folder: &RemoteId) -> Result<Vec<RemoteEntry>>;

    /// Contents of a remote file
    fn download(&self, file: &RemoteId) -> Result<Vec<u8>>;

    /// Remove a file, or a folder with everything in it
    fn delete(&self, id: &RemoteId) -> Result<()>;
}

impl<T: RemoteArchiveTransfer + ?Sized> RemoteArchiveTransfer for std::sync::Arc<T> {
    fn find_or_create_container(&self, label: &str) -> Result<RemoteId> {
        (**self).find_or_create_container(label)
    }

    fn create_subfolder(&self, parent: &RemoteId, name: &str) -> Result<RemoteId> {
        (**self).create_subfolder(parent, name)
    }

    fn upload_archive(&self, folder: &RemoteId, local_path: &Path) -> Result<RemoteId> {
        (**self).upload_archive(folder, local_path)
    }

    fn list_children(&self, folder: &RemoteId) -> Result<Vec<RemoteEntry>> {
        (**self).list_children(folder)
    }

    fn download(&self, file: &RemoteId) -> Result<Vec<u8>> {
        (**self).download(file)
    }

    fn delete(&self, id: &RemoteId) -> Result<()> {
        (**self).delete(id)
    }
}
