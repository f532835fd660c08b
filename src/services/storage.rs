//! Cloud storage seam
//!
//! The pipeline only needs to find an element by name inside a folder, list a
//! folder, copy a file into a folder and create folders. [`MountedStorage`] serves
//! these from a cloud drive mounted on the local filesystem (rclone and friends),
//! where element ids are absolute paths.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EngineError;

/// A file or folder in remote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteElement {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
}

#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Find the element called `name` directly inside the folder `parent_id`.
    async fn lookup(&self, parent_id: &str, name: &str) -> Result<Option<RemoteElement>, EngineError>;

    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteElement>, EngineError>;

    /// Copy a file into `destination_folder_id`, keeping its name.
    async fn copy_file(
        &self,
        file: &RemoteElement,
        destination_folder_id: &str,
    ) -> Result<RemoteElement, EngineError>;

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteElement, EngineError>;
}

/// Storage mounted on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct MountedStorage;

impl MountedStorage {
    pub fn new() -> Self {
        Self
    }

    fn element(path: &Path, is_folder: bool) -> RemoteElement {
        RemoteElement {
            id: path.to_string_lossy().into_owned(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            is_folder,
        }
    }
}

#[async_trait]
impl RemoteStorage for MountedStorage {
    async fn lookup(&self, parent_id: &str, name: &str) -> Result<Option<RemoteElement>, EngineError> {
        let path = Path::new(parent_id).join(name);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(Self::element(&path, metadata.is_dir()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteElement>, EngineError> {
        let mut entries = tokio::fs::read_dir(folder_id).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_folder = entry.file_type().await?.is_dir();
            children.push(Self::element(&entry.path(), is_folder));
        }
        Ok(children)
    }

    async fn copy_file(
        &self,
        file: &RemoteElement,
        destination_folder_id: &str,
    ) -> Result<RemoteElement, EngineError> {
        let target = Path::new(destination_folder_id).join(&file.name);
        let bytes = tokio::fs::copy(&file.id, &target).await?;
        debug!(source = %file.id, target = %target.display(), bytes, "Copied file");
        Ok(Self::element(&target, false))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteElement, EngineError> {
        let path = Path::new(parent_id).join(name);
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self::element(&path, true))
    }
}
