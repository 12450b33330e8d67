use super::{RemoteArchiveTransfer, RemoteEntry, RemoteId, RemoteKind};
use crate::error::{Result, SaveSyncError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<RemoteId>,
    kind: RemoteKind,
    created_at: DateTime<Utc>,
    data: Vec<u8>,
}

/// In-memory blob store with uuid identifiers
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    nodes: RwLock<HashMap<RemoteId, Node>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files and folders held
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn find_child(
        nodes: &HashMap<RemoteId, Node>,
        parent: Option<&RemoteId>,
        name: &str,
        kind: RemoteKind,
    ) -> Option<RemoteId> {
        nodes
            .iter()
            .find(|(_, n)| n.parent.as_ref() == parent && n.name == name && n.kind == kind)
            .map(|(id, _)| id.clone())
    }

    fn insert(&self, parent: Option<&RemoteId>, name: &str, kind: RemoteKind, data: Vec<u8>) -> RemoteId {
        let mut nodes = self.nodes.write();
        if let Some(existing) = Self::find_child(&nodes, parent, name, kind) {
            if let Some(node) = nodes.get_mut(&existing) {
                node.data = data;
            }
            return existing;
        }
        let id = RemoteId(Uuid::new_v4().to_string());
        nodes.insert(
            id.clone(),
            Node {
                name: name.to_string(),
                parent: parent.cloned(),
                kind,
                created_at: Utc::now(),
                data,
            },
        );
        id
    }

    fn require_folder(&self, id: &RemoteId) -> Result<()> {
        match self.nodes.read().get(id) {
            Some(node) if node.kind == RemoteKind::Folder => Ok(()),
            Some(_) => Err(SaveSyncError::remote(format!("{} is not a folder", id))),
            None => Err(SaveSyncError::remote(format!("no remote folder {}", id))),
        }
    }
}

impl RemoteArchiveTransfer for MemoryBlobStore {
    fn find_or_create_container(&self, label: &str) -> Result<RemoteId> {
        Ok(self.insert(None, label, RemoteKind::Folder, Vec::new()))
    }

    fn create_subfolder(&self, parent: &RemoteId, name: &str) -> Result<RemoteId> {
        self.require_folder(parent)?;
        Ok(self.insert(Some(parent), name, RemoteKind::Folder, Vec::new()))
    }

    fn upload_archive(&self, folder: &RemoteId, local_path: &Path) -> Result<RemoteId> {
        self.require_folder(folder)?;
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SaveSyncError::remote(format!("{:?} has no file name", local_path)))?;
        let data = fs::read(local_path)
            .map_err(|e| SaveSyncError::remote(format!("cannot read {:?}: {}", local_path, e)))?;
        Ok(self.insert(Some(folder), &name, RemoteKind::File, data))
    }

    fn list_children(&self, folder: &RemoteId) -> Result<Vec<RemoteEntry>> {
        self.require_folder(folder)?;
        let nodes = self.nodes.read();
        let mut children: Vec<RemoteEntry> = nodes
            .iter()
            .filter(|(_, n)| n.parent.as_ref() == Some(folder))
            .map(|(id, n)| RemoteEntry {
                id: id.clone(),
                name: n.name.clone(),
                kind: n.kind,
                created_at: n.created_at,
            })
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn download(&self, file: &RemoteId) -> Result<Vec<u8>> {
        match self.nodes.read().get(file) {
            Some(node) if node.kind == RemoteKind::File => Ok(node.data.clone()),
            Some(_) => Err(SaveSyncError::remote(format!("{} is a folder", file))),
            None => Err(SaveSyncError::remote(format!("no remote file {}", file))),
        }
    }

    fn delete(&self, id: &RemoteId) -> Result<()> {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(id) {
            return Err(SaveSyncError::remote(format!("no remote entry {}", id)));
        }
        let mut pending = vec![id.clone()];
        while let Some(current) = pending.pop() {
            pending.extend(
                nodes
                    .iter()
                    .filter(|(_, n)| n.parent.as_ref() == Some(&current))
                    .map(|(child, _)| child.clone()),
            );
            nodes.remove(&current);
        }
        Ok(())
    }
}
