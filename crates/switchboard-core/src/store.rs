//! Live workspaces and their persistence.

use crate::config::GatewaySettings;
use crate::coordinator::OAuthCoordinator;
use crate::error::{GatewayError, GatewayResult};
use crate::registry::RegistryClient;
use crate::target::{Target, TargetPatch};
use crate::workspace::{Workspace, WorkspacePatch};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use switchboard_storage::{ConfigStore, PromptRecord, ServerRecord, WorkspaceRecord};
use switchboard_util::slug::unique_slug;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Every live workspace, keyed by id.
pub struct WorkspaceStore {
    config: Arc<dyn ConfigStore>,
    coordinator: Arc<OAuthCoordinator>,
    settings: GatewaySettings,
    registry: Option<Arc<dyn RegistryClient>>,
    workspaces: RwLock<BTreeMap<String, Arc<Workspace>>>,
    /// Serializes create/delete so id allocation holds across awaits.
    lifecycle: Mutex<()>,
}

impl WorkspaceStore {
    /// Load every persisted workspace and connect it.
    ///
    /// Targets that fail to connect are kept in error state; they never block
    /// startup.
    pub async fn bootstrap(
        config: Arc<dyn ConfigStore>,
        coordinator: Arc<OAuthCoordinator>,
        settings: GatewaySettings,
    ) -> GatewayResult<Self> {
        let records = config.get_all().await?;
        let store = Self {
            config,
            coordinator,
            settings,
            registry: None,
            workspaces: RwLock::new(BTreeMap::new()),
            lifecycle: Mutex::new(()),
        };

        for record in records {
            let workspace = Workspace::from_record(
                &record,
                store.settings.clone(),
                Some(store.coordinator.clone()),
                false,
            )
            .await?;
            store.workspaces.write().await.insert(record.id.clone(), workspace);
        }

        info!(count = store.workspaces.read().await.len(), "Workspaces loaded");
        Ok(store)
    }

    /// Registry used by [`WorkspaceStore::add_from_registry`].
    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn coordinator(&self) -> &Arc<OAuthCoordinator> {
        &self.coordinator
    }

    /// Create an empty workspace with an id derived from `name`.
    pub async fn create(&self, name: &str, description: Option<String>) -> GatewayResult<Arc<Workspace>> {
        if name.trim().is_empty() {
            return Err(GatewayError::BadRequest("Workspace name must not be empty".to_string()));
        }

        let _guard = self.lifecycle.lock().await;
        let id = {
            let workspaces = self.workspaces.read().await;
            unique_slug(name, |candidate| workspaces.contains_key(candidate))
        };

        let mut record = WorkspaceRecord::new(id.clone(), name.trim());
        record.description = description.filter(|d| !d.is_empty());

        self.config.add_proxy(&record).await?;
        let workspace = Workspace::from_record(
            &record,
            self.settings.clone(),
            Some(self.coordinator.clone()),
            false,
        )
        .await?;
        self.workspaces.write().await.insert(id.clone(), workspace.clone());

        info!(workspace = %id, "Workspace created");
        Ok(workspace)
    }

    pub async fn get(&self, id: &str) -> GatewayResult<Arc<Workspace>> {
        self.workspaces
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::unknown("workspace", id))
    }

    /// Live workspaces ordered by id.
    pub async fn list(&self) -> Vec<Arc<Workspace>> {
        self.workspaces.read().await.values().cloned().collect()
    }

    /// Close, evict and forget a workspace.
    pub async fn delete(&self, id: &str) -> GatewayResult<()> {
        let _guard = self.lifecycle.lock().await;
        let workspace = self
            .workspaces
            .write()
            .await
            .remove(id)
            .ok_or_else(|| GatewayError::unknown("workspace", id))?;

        workspace.close().await;
        self.config.delete_proxy(id).await?;
        info!(workspace = %id, "Workspace deleted");
        Ok(())
    }

    async fn persist(&self, workspace: &Workspace) -> GatewayResult<()> {
        self.persist_record(&workspace.to_record().await).await
    }

    async fn persist_record(&self, record: &WorkspaceRecord) -> GatewayResult<()> {
        self.config.update_proxy(record).await.map_err(|e| {
            error!(workspace = %record.id, error = %e, "Failed to persist workspace");
            GatewayError::from(e)
        })
    }

    /// Add and connect a target. The target is dropped again if the workspace
    /// cannot be persisted.
    pub async fn add_target(
        &self,
        id: &str,
        record: ServerRecord,
        throw_on_error: bool,
    ) -> GatewayResult<Arc<Target>> {
        let workspace = self.get(id).await?;
        let target = workspace.add_target(record, throw_on_error).await?;
        if let Err(e) = self.persist(&workspace).await {
            undo(id, workspace.remove_target(target.name()).await);
            return Err(e);
        }
        Ok(target)
    }

    /// Persist the workspace without the target, then close it.
    pub async fn remove_target(&self, id: &str, name: &str) -> GatewayResult<Arc<Target>> {
        let workspace = self.get(id).await?;
        let target = workspace
            .target(name)
            .await
            .ok_or_else(|| GatewayError::unknown("target", name))?;

        let mut record = workspace.to_record().await;
        record.servers.retain(|s| s.name != target.name());
        self.persist_record(&record).await?;
        workspace.remove_target(name).await
    }

    /// Apply a target patch. The settings are persisted even when re-enabling
    /// fails to connect; they are reverted if persisting fails.
    pub async fn update_target(
        &self,
        id: &str,
        name: &str,
        patch: TargetPatch,
    ) -> GatewayResult<Arc<Target>> {
        let workspace = self.get(id).await?;
        let previous = match workspace.target(name).await {
            Some(target) => target.settings().await,
            None => return Err(GatewayError::unknown("target", name)),
        };

        let result = workspace.update_target(name, patch).await;
        if matches!(result, Err(GatewayError::NotFound(_))) {
            return result;
        }
        if let Err(e) = self.persist(&workspace).await {
            let revert = TargetPatch {
                tool_prefix: Some(previous.tool_prefix.unwrap_or_default()),
                disabled_tools: Some(previous.disabled_tools),
                disabled: Some(previous.disabled),
            };
            undo(id, workspace.update_target(name, revert).await);
            return Err(e);
        }
        result
    }

    pub async fn update_workspace(&self, id: &str, patch: WorkspacePatch) -> GatewayResult<Arc<Workspace>> {
        let workspace = self.get(id).await?;
        let previous = workspace.to_record().await;
        workspace.update(patch).await?;
        if let Err(e) = self.persist(&workspace).await {
            let revert = WorkspacePatch {
                name: Some(previous.name),
                description: Some(previous.description.unwrap_or_default()),
                add_tool_prefix: Some(previous.add_tool_prefix),
            };
            undo(id, workspace.update(revert).await);
            return Err(e);
        }
        Ok(workspace)
    }

    pub async fn add_prompt(&self, id: &str, prompt: PromptRecord) -> GatewayResult<()> {
        let workspace = self.get(id).await?;
        let name = prompt.name.clone();
        workspace.add_prompt(prompt).await?;
        if let Err(e) = self.persist(&workspace).await {
            undo(id, workspace.remove_prompt(&name).await);
            return Err(e);
        }
        Ok(())
    }

    pub async fn update_prompt(&self, id: &str, name: &str, prompt: PromptRecord) -> GatewayResult<()> {
        let workspace = self.get(id).await?;
        let previous = workspace
            .prompts()
            .await
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| GatewayError::unknown("prompt", name))?;

        let new_name = prompt.name.clone();
        workspace.update_prompt(name, prompt).await?;
        if let Err(e) = self.persist(&workspace).await {
            undo(id, workspace.update_prompt(&new_name, previous).await);
            return Err(e);
        }
        Ok(())
    }

    /// Persist the workspace without the prompt, then drop it.
    pub async fn remove_prompt(&self, id: &str, name: &str) -> GatewayResult<PromptRecord> {
        let workspace = self.get(id).await?;
        let mut record = workspace.to_record().await;
        let before = record.prompts.len();
        record.prompts.retain(|p| p.name != name);
        if record.prompts.len() == before {
            return Err(GatewayError::unknown("prompt", name));
        }

        self.persist_record(&record).await?;
        workspace.remove_prompt(name).await
    }

    /// Point installer `client` at workspace `id`.
    pub async fn link_client(&self, client: &str, id: &str) -> GatewayResult<()> {
        self.get(id).await?;
        Ok(self.config.set_workspace(client, id).await?)
    }

    pub async fn unlink_client(&self, client: &str) -> GatewayResult<()> {
        Ok(self.config.unset_workspace(client).await?)
    }

    /// Install a registry entry into workspace `id` as `target_name`.
    pub async fn add_from_registry(
        &self,
        id: &str,
        entry_name: &str,
        target_name: &str,
        values: &HashMap<String, String>,
    ) -> GatewayResult<Arc<Target>> {
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| GatewayError::BadRequest("No registry configured".to_string()))?;
        let entry = registry
            .get_entry_by_name(entry_name)
            .await?
            .ok_or_else(|| GatewayError::unknown("registry entry", entry_name))?;

        let record = entry.instantiate(target_name, values)?;
        self.add_target(id, record, true).await
    }

    /// Close every workspace.
    pub async fn close(&self) {
        let workspaces = self.list().await;
        futures::future::join_all(workspaces.iter().map(|w| w.close())).await;
        info!("All workspaces closed");
    }
}

/// Log a failed rollback; the persist error is what the caller sees.
fn undo<T>(workspace: &str, result: GatewayResult<T>) {
    if let Err(e) = result {
        warn!(workspace = %workspace, error = %e, "Failed to roll back unsaved change");
    }
}
