use super::{RemoteArchiveTransfer, RemoteEntry, RemoteId, RemoteKind};
use crate::error::{Result, SaveSyncError};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Blob store backed by a local directory
///
/// Folders are directories and ids are `/`-separated paths relative to the
/// store root. Pointing this at a synced cloud-drive folder gives remote
/// backups without any provider API.
#[derive(Debug, Clone)]
pub struct LocalFolderStore {
    root: PathBuf,
}

fn remote_err(context: &str, path: &Path, err: std::io::Error) -> SaveSyncError {
    SaveSyncError::remote(format!("{} {}: {}", context, path.display(), err))
}

/// A single, plain path component
fn check_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(SaveSyncError::remote(format!("invalid remote name {:?}", name))),
    }
}

impl LocalFolderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, id: &RemoteId) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in id.as_str().split('/') {
            check_name(part)?;
            path.push(part);
        }
        Ok(path)
    }

    fn child_id(parent: &RemoteId, name: &str) -> RemoteId {
        RemoteId(format!("{}/{}", parent.as_str(), name))
    }

    fn require_folder(&self, id: &RemoteId) -> Result<PathBuf> {
        let path = self.resolve(id)?;
        if path.is_dir() {
            Ok(path)
        } else {
            Err(SaveSyncError::remote(format!("no remote folder {}", id)))
        }
    }
}

impl RemoteArchiveTransfer for LocalFolderStore {
    fn find_or_create_container(&self, label: &str) -> Result<RemoteId> {
        check_name(label)?;
        let path = self.root.join(label);
        fs::create_dir_all(&path).map_err(|e| remote_err("cannot create", &path, e))?;
        Ok(RemoteId(label.to_string()))
    }

    fn create_subfolder(&self, parent: &RemoteId, name: &str) -> Result<RemoteId> {
        check_name(name)?;
        let parent_path = self.require_folder(parent)?;
        let path = parent_path.join(name);
        fs::create_dir_all(&path).map_err(|e| remote_err("cannot create", &path, e))?;
        Ok(Self::child_id(parent, name))
    }

    fn upload_archive(&self, folder: &RemoteId, local_path: &Path) -> Result<RemoteId> {
        let folder_path = self.require_folder(folder)?;
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SaveSyncError::remote(format!("{:?} has no file name", local_path)))?;
        let target = folder_path.join(&name);
        fs::copy(local_path, &target).map_err(|e| remote_err("cannot upload to", &target, e))?;
        debug!("Uploaded {:?} to {:?}", local_path, target);
        Ok(Self::child_id(folder, &name))
    }

    fn list_children(&self, folder: &RemoteId) -> Result<Vec<RemoteEntry>> {
        let folder_path = self.require_folder(folder)?;
        let entries = fs::read_dir(&folder_path).map_err(|e| remote_err("cannot list", &folder_path, e))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| remote_err("cannot list", &folder_path, e))?;
            let metadata = entry
                .metadata()
                .map_err(|e| remote_err("cannot stat", &entry.path(), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let created_at = metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            children.push(RemoteEntry {
                id: Self::child_id(folder, &name),
                kind: if metadata.is_dir() {
                    RemoteKind::Folder
                } else {
                    RemoteKind::File
                },
                name,
                created_at,
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn download(&self, file: &RemoteId) -> Result<Vec<u8>> {
        let path = self.resolve(file)?;
        if path.is_dir() {
            return Err(SaveSyncError::remote(format!("{} is a folder", file)));
        }
        fs::read(&path).map_err(|e| remote_err("cannot download", &path, e))
    }

    fn delete(&self, id: &RemoteId) -> Result<()> {
        let path = self.resolve(id)?;
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| remote_err("cannot delete", &path, e))
    }
}
