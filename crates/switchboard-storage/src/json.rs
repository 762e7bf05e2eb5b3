//! JSON file-based config store.
//!
//! Layout under the base directory:
//! - `workspaces/<id>.json`: one [`WorkspaceRecord`] per file
//! - `clients/<client>.json`: one [`ClientLink`] per file

use crate::{ClientLink, ConfigStore, StorageError, StorageResult, WorkspaceRecord};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const WORKSPACES_DIR: &str = "workspaces";
const CLIENTS_DIR: &str = "clients";

/// Config store backed by pretty-printed JSON files.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    base_path: PathBuf,
}

impl JsonConfigStore {
    /// Create a store rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// The directory this store writes to.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, dir: &str, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key == "."
            || key == ".."
        {
            return Err(StorageError::invalid_key(format!(
                "invalid key component: {key}"
            )));
        }
        Ok(self.base_path.join(dir).join(format!("{key}.json")))
    }

    async fn read_file<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| StorageError::invalid_record(path.display().to_string(), e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write_file<T: Serialize + Sync>(path: &Path, value: &T) -> StorageResult<()> {
        debug!(path = %path.display(), "Writing record");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(value)?;

        // Write to a sibling temp file first so readers never see half a record.
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    async fn remove_file(path: &Path) -> StorageResult<()> {
        debug!(path = %path.display(), "Removing record");
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Every `*.json` file in a sub-directory, sorted by file name.
    async fn list_files(&self, dir: &str) -> StorageResult<Vec<PathBuf>> {
        let dir = self.base_path.join(dir);
        let mut files = Vec::new();

        match fs::read_dir(&dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        files.push(path);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }

        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn get_all(&self) -> StorageResult<Vec<WorkspaceRecord>> {
        let mut records = Vec::new();
        for path in self.list_files(WORKSPACES_DIR).await? {
            let Some(record) = Self::read_file::<WorkspaceRecord>(&path).await? else {
                continue;
            };
            record
                .validate()
                .map_err(|message| StorageError::invalid_record(path.display().to_string(), message))?;
            records.push(record);
        }
        debug!(count = records.len(), "Loaded workspace records");
        Ok(records)
    }

    async fn add_proxy(&self, record: &WorkspaceRecord) -> StorageResult<()> {
        let path = self.record_path(WORKSPACES_DIR, &record.id)?;
        if fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(record.id.clone()));
        }
        Self::write_file(&path, record).await
    }

    async fn update_proxy(&self, record: &WorkspaceRecord) -> StorageResult<()> {
        let path = self.record_path(WORKSPACES_DIR, &record.id)?;
        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(record.id.clone()));
        }
        Self::write_file(&path, record).await
    }

    async fn delete_proxy(&self, id: &str) -> StorageResult<()> {
        let path = self.record_path(WORKSPACES_DIR, id)?;
        Self::remove_file(&path).await
    }

    async fn set_workspace(&self, client: &str, workspace_id: &str) -> StorageResult<()> {
        let path = self.record_path(CLIENTS_DIR, client)?;
        let link = ClientLink {
            client: client.to_string(),
            workspace_id: workspace_id.to_string(),
        };
        Self::write_file(&path, &link).await
    }

    async fn unset_workspace(&self, client: &str) -> StorageResult<()> {
        let path = self.record_path(CLIENTS_DIR, client)?;
        Self::remove_file(&path).await
    }

    async fn client_links(&self) -> StorageResult<Vec<ClientLink>> {
        let mut links = Vec::new();
        for path in self.list_files(CLIENTS_DIR).await? {
            if let Some(link) = Self::read_file::<ClientLink>(&path).await? {
                links.push(link);
            }
        }
        Ok(links)
    }
}
