//! In-memory config store for testing and embedding.

use crate::{ClientLink, ConfigStore, StorageError, StorageResult, WorkspaceRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Config store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    workspaces: RwLock<BTreeMap<String, WorkspaceRecord>>,
    clients: RwLock<BTreeMap<String, String>>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = WorkspaceRecord>) -> Self {
        let workspaces = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            workspaces: RwLock::new(workspaces),
            clients: RwLock::new(BTreeMap::new()),
        }
    }

    /// Fetch a single record.
    pub async fn get(&self, id: &str) -> Option<WorkspaceRecord> {
        self.workspaces.read().await.get(id).cloned()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_all(&self) -> StorageResult<Vec<WorkspaceRecord>> {
        let workspaces = self.workspaces.read().await;
        let mut records = Vec::with_capacity(workspaces.len());
        for (id, record) in workspaces.iter() {
            record
                .validate()
                .map_err(|message| StorageError::invalid_record(format!("memory:{id}"), message))?;
            records.push(record.clone());
        }
        Ok(records)
    }

    async fn add_proxy(&self, record: &WorkspaceRecord) -> StorageResult<()> {
        let mut workspaces = self.workspaces.write().await;
        if workspaces.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists(record.id.clone()));
        }
        workspaces.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_proxy(&self, record: &WorkspaceRecord) -> StorageResult<()> {
        let mut workspaces = self.workspaces.write().await;
        match workspaces.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(record.id.clone())),
        }
    }

    async fn delete_proxy(&self, id: &str) -> StorageResult<()> {
        self.workspaces.write().await.remove(id);
        Ok(())
    }

    async fn set_workspace(&self, client: &str, workspace_id: &str) -> StorageResult<()> {
        self.clients
            .write()
            .await
            .insert(client.to_string(), workspace_id.to_string());
        Ok(())
    }

    async fn unset_workspace(&self, client: &str) -> StorageResult<()> {
        self.clients.write().await.remove(client);
        Ok(())
    }

    async fn client_links(&self) -> StorageResult<Vec<ClientLink>> {
        Ok(self
            .clients
            .read()
            .await
            .iter()
            .map(|(client, workspace_id)| ClientLink {
                client: client.clone(),
                workspace_id: workspace_id.clone(),
            })
            .collect())
    }
}
