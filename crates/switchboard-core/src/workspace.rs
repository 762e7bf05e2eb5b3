//! Capability aggregation.
//!
//! A [`Workspace`] owns an ordered set of targets and presents them as one MCP
//! server. Listings are merged in target order (prompt library first, user
//! targets, controller last) into a [`CapabilitySnapshot`] whose routing table
//! maps every exposed name back to the owning target.

use crate::config::GatewaySettings;
use crate::controller::{Controller, CONTROLLER_PREFIX, CONTROLLER_TARGET};
use crate::coordinator::{normalize, OAuthCoordinator};
use crate::error::{GatewayError, GatewayResult};
use crate::prompts::{PromptLibrary, PROMPT_LIBRARY_TARGET};
use crate::retry::ReconnectPolicy;
use crate::target::{ConnectOutcome, Target, TargetInfo, TargetKind, TargetPatch, PREFIX_SEPARATOR};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchboard_mcp::{
    JsonRpcError, McpHandler, McpPrompt, McpResource, McpResourceTemplate, McpTool, ServerInfo,
};
use switchboard_storage::{PromptRecord, ServerRecord, WorkspaceRecord};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Where an exposed name is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Owning target.
    pub target: String,
    /// Name (or URI) as the target exposes it.
    pub name: String,
}

/// One merged listing plus the routing table derived from it.
#[derive(Debug, Clone)]
pub struct CapabilitySnapshot<T> {
    pub items: Vec<T>,
    pub routes: HashMap<String, Route>,
    /// Workspace generation the listing was built at.
    pub generation: u64,
}

impl<T> CapabilitySnapshot<T> {
    pub fn route(&self, exposed: &str) -> Option<&Route> {
        self.routes.get(exposed)
    }
}

#[derive(Default)]
struct Snapshots {
    tools: Option<Arc<CapabilitySnapshot<McpTool>>>,
    prompts: Option<Arc<CapabilitySnapshot<McpPrompt>>>,
    resources: Option<Arc<CapabilitySnapshot<McpResource>>>,
    templates: Option<Arc<CapabilitySnapshot<McpResourceTemplate>>>,
}

/// Partial update of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspacePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub add_tool_prefix: Option<bool>,
}

struct WorkspaceMeta {
    name: String,
    description: Option<String>,
    add_tool_prefix: bool,
}

/// Serializable view of a workspace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub add_tool_prefix: bool,
    pub targets: Vec<TargetInfo>,
    pub prompts: Vec<PromptRecord>,
}

/// A named aggregate of targets.
pub struct Workspace {
    id: String,
    meta: RwLock<WorkspaceMeta>,
    targets: RwLock<Vec<Arc<Target>>>,
    library: Arc<PromptLibrary>,
    library_target: Arc<Target>,
    controller: Option<Arc<Target>>,
    settings: GatewaySettings,
    coordinator: Option<Arc<OAuthCoordinator>>,
    reconnect: ReconnectPolicy,
    /// Serializes add/remove/update so name checks hold across awaits.
    mutation: Mutex<()>,
    generation: AtomicU64,
    snapshots: RwLock<Snapshots>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    fn build(
        record: &WorkspaceRecord,
        settings: GatewaySettings,
        coordinator: Option<Arc<OAuthCoordinator>>,
    ) -> Arc<Self> {
        let timeout = settings.request_timeout;

        Arc::new_cyclic(|weak| {
            let library = Arc::new(PromptLibrary::new(record.prompts.clone()));
            let library_target = Arc::new(Target::in_process(
                PROMPT_LIBRARY_TARGET,
                library.clone(),
                None,
                timeout,
            ));
            let controller = settings.enable_controller.then(|| {
                Arc::new(Target::in_process(
                    CONTROLLER_TARGET,
                    Arc::new(Controller::new(weak.clone())),
                    Some(CONTROLLER_PREFIX.to_string()),
                    timeout,
                ))
            });

            let targets = record
                .servers
                .iter()
                .map(|server| {
                    let target = Target::from_record(server, coordinator.clone(), timeout);
                    target.set_auto_prefix(record.add_tool_prefix);
                    Arc::new(target)
                })
                .collect();

            Self {
                id: record.id.clone(),
                meta: RwLock::new(WorkspaceMeta {
                    name: record.name.clone(),
                    description: record.description.clone(),
                    add_tool_prefix: record.add_tool_prefix,
                }),
                targets: RwLock::new(targets),
                library,
                library_target,
                controller,
                settings,
                coordinator,
                reconnect: ReconnectPolicy::default(),
                mutation: Mutex::new(()),
                generation: AtomicU64::new(0),
                snapshots: RwLock::new(Snapshots::default()),
            }
        })
    }

    /// Build a workspace from its record and connect every enabled target.
    ///
    /// With `throw_on_error` any connection failure closes the workspace and
    /// is returned; otherwise failing targets are kept in error state.
    pub async fn from_record(
        record: &WorkspaceRecord,
        settings: GatewaySettings,
        coordinator: Option<Arc<OAuthCoordinator>>,
        throw_on_error: bool,
    ) -> GatewayResult<Arc<Self>> {
        record
            .validate()
            .map_err(GatewayError::InvalidConfiguration)?;

        let workspace = Self::build(record, settings, coordinator.clone());
        if let Some(coordinator) = &coordinator {
            coordinator.track(&workspace).await;
        }

        if let Err(e) = workspace.connect(throw_on_error).await {
            workspace.close().await;
            return Err(e);
        }
        Ok(workspace)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn name(&self) -> String {
        self.meta.read().await.name.clone()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Connect every enabled target, `connect_concurrency` at a time.
    pub async fn connect(&self, throw_on_error: bool) -> GatewayResult<()> {
        let mut targets = vec![self.library_target.clone()];
        for target in self.targets.read().await.iter() {
            if !target.is_disabled().await {
                targets.push(target.clone());
            }
        }
        targets.extend(self.controller.clone());

        let results: Vec<(String, GatewayResult<ConnectOutcome>)> = stream::iter(targets)
            .map(|target| async move {
                let result = target.connect(throw_on_error).await;
                (target.name().to_string(), result)
            })
            .buffered(self.settings.connect_concurrency)
            .collect()
            .await;
        self.bump();

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(name, result)| match result {
                Err(e) => Some(format!("{name}: {e}")),
                Ok(ConnectOutcome::Failed(message)) => Some(format!("{name}: {message}")),
                Ok(_) => None,
            })
            .collect();

        if failures.is_empty() {
            info!(workspace = %self.id, "Workspace connected");
            return Ok(());
        }

        warn!(workspace = %self.id, failed = failures.len(), "Some targets failed to connect");
        if throw_on_error {
            return Err(GatewayError::ConnectionRefused(failures.join("; ")));
        }
        Ok(())
    }

    /// User targets in insertion order.
    pub async fn targets(&self) -> Vec<Arc<Target>> {
        self.targets.read().await.clone()
    }

    /// Every target including the prompt library and the controller.
    async fn all_targets(&self) -> Vec<Arc<Target>> {
        let mut all = vec![self.library_target.clone()];
        all.extend(self.targets.read().await.iter().cloned());
        all.extend(self.controller.clone());
        all
    }

    /// User target by name, compared case-insensitively.
    pub async fn target(&self, name: &str) -> Option<Arc<Target>> {
        self.targets
            .read()
            .await
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    fn is_reserved(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(PROMPT_LIBRARY_TARGET)
            || (self.controller.is_some() && name.eq_ignore_ascii_case(CONTROLLER_TARGET))
    }

    pub async fn targets_info(&self) -> Vec<TargetInfo> {
        let mut infos = Vec::new();
        for target in self.targets.read().await.iter() {
            infos.push(target.info().await);
        }
        infos
    }

    /// Add and connect a target.
    pub async fn add_target(
        &self,
        record: ServerRecord,
        throw_on_error: bool,
    ) -> GatewayResult<Arc<Target>> {
        let _guard = self.mutation.lock().await;

        if record.name.trim().is_empty() {
            return Err(GatewayError::BadRequest("Target name must not be empty".to_string()));
        }
        record
            .transport
            .validate(&record.name)
            .map_err(GatewayError::BadRequest)?;
        if self.is_reserved(&record.name) || self.target(&record.name).await.is_some() {
            return Err(GatewayError::Duplicate(format!(
                "Target '{}' already exists in workspace '{}'",
                record.name, self.id
            )));
        }

        let target = Arc::new(Target::from_record(
            &record,
            self.coordinator.clone(),
            self.settings.request_timeout,
        ));
        target.set_auto_prefix(self.meta.read().await.add_tool_prefix);

        if !record.disabled {
            if let Err(e) = target.connect(throw_on_error).await {
                target.close().await;
                return Err(e);
            }
        }

        self.targets.write().await.push(target.clone());
        self.bump();
        info!(workspace = %self.id, target_name = %target.name(), "Target added");
        Ok(target)
    }

    /// Close and remove a target, returning it in its closed state.
    pub async fn remove_target(&self, name: &str) -> GatewayResult<Arc<Target>> {
        let _guard = self.mutation.lock().await;

        let target = {
            let mut targets = self.targets.write().await;
            let index = targets
                .iter()
                .position(|t| t.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| GatewayError::unknown("target", name))?;
            targets.remove(index)
        };

        target.close().await;
        self.bump();
        info!(workspace = %self.id, target_name = %target.name(), "Target removed");
        Ok(target)
    }

    pub async fn update_target(&self, name: &str, patch: TargetPatch) -> GatewayResult<Arc<Target>> {
        let _guard = self.mutation.lock().await;
        let target = self
            .target(name)
            .await
            .ok_or_else(|| GatewayError::unknown("target", name))?;

        let result = target.update(patch).await;
        self.bump();
        result.map(|()| target)
    }

    pub async fn update(&self, patch: WorkspacePatch) -> GatewayResult<()> {
        let _guard = self.mutation.lock().await;

        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(GatewayError::BadRequest(
                    "Workspace name must not be empty".to_string(),
                ));
            }
        }

        let prefix_changed = {
            let mut meta = self.meta.write().await;
            if let Some(name) = patch.name {
                meta.name = name;
            }
            if let Some(description) = patch.description {
                meta.description = Some(description).filter(|d| !d.is_empty());
            }
            match patch.add_tool_prefix {
                Some(add) if add != meta.add_tool_prefix => {
                    meta.add_tool_prefix = add;
                    Some(add)
                }
                _ => None,
            }
        };

        if let Some(add) = prefix_changed {
            for target in self.targets.read().await.iter() {
                target.set_auto_prefix(add);
            }
        }
        self.bump();
        Ok(())
    }

    /// Reconnect a user target. Process and in-process targets are retried;
    /// network targets get a single attempt.
    pub async fn reconnect_target(&self, name: &str) -> GatewayResult<Arc<Target>> {
        let target = self
            .target(name)
            .await
            .ok_or_else(|| GatewayError::unknown("target", name))?;
        if target.is_disabled().await {
            return Err(GatewayError::BadRequest(format!("Target '{name}' is disabled")));
        }

        let result = match target.kind() {
            TargetKind::Network { .. } => target.connect(true).await.map(|_| ()),
            _ => self
                .reconnect
                .run(target.name(), |_| {
                    let target = target.clone();
                    async move { target.connect(true).await.map(|_| ()) }
                })
                .await,
        };
        self.bump();
        result.map(|()| target)
    }

    /// Reconnect every enabled network target using `url` after an OAuth code
    /// arrived for it.
    pub async fn complete_auth_flow(&self, url: &str, code: &str) -> Vec<GatewayResult<ConnectOutcome>> {
        let url = normalize(url);
        let mut results = Vec::new();
        for target in self.targets().await {
            let matches = target.url().map(normalize).as_deref() == Some(url.as_str());
            if matches && !target.is_disabled().await {
                results.push(target.complete_auth_flow(code).await);
            }
        }
        if !results.is_empty() {
            self.bump();
        }
        results
    }

    async fn live_targets(&self) -> Vec<Arc<Target>> {
        let mut live = Vec::new();
        for target in self.all_targets().await {
            if target.is_live().await {
                live.push(target);
            }
        }
        live
    }

    /// Query every live target; failures are logged and skipped.
    async fn gather<T, F, Fut>(&self, kind: &'static str, fetch: F) -> Vec<(Arc<Target>, Vec<T>)>
    where
        F: Fn(Arc<Target>) -> Fut,
        Fut: Future<Output = GatewayResult<Vec<T>>>,
    {
        let results: Vec<(Arc<Target>, GatewayResult<Vec<T>>)> =
            stream::iter(self.live_targets().await)
                .map(|target| {
                    let listing = fetch(target.clone());
                    async move { (target, listing.await) }
                })
                .buffered(self.settings.connect_concurrency)
                .collect()
                .await;

        results
            .into_iter()
            .filter_map(|(target, result)| match result {
                Ok(items) => Some((target, items)),
                Err(e) => {
                    warn!(
                        workspace = %self.id,
                        target_name = %target.name(),
                        kind,
                        error = %e,
                        "Listing failed, skipping target"
                    );
                    None
                }
            })
            .collect()
    }

    /// Merged tool listing. Later duplicates are exposed as `<target>__<name>`.
    pub async fn list_tools(&self) -> Arc<CapabilitySnapshot<McpTool>> {
        let generation = self.generation();
        let listed = self.gather("tools", |t| async move { t.list_tools().await }).await;

        let mut items = Vec::new();
        let mut routes = HashMap::new();
        for (target, tools) in listed {
            for mut tool in tools {
                let exposed = disambiguate(&routes, target.name(), &tool.name);
                routes.insert(
                    exposed.clone(),
                    Route {
                        target: target.name().to_string(),
                        name: std::mem::replace(&mut tool.name, exposed),
                    },
                );
                items.push(tool);
            }
        }

        let snapshot = Arc::new(CapabilitySnapshot {
            items,
            routes,
            generation,
        });
        self.snapshots.write().await.tools = Some(snapshot.clone());
        snapshot
    }

    pub async fn list_prompts(&self) -> Arc<CapabilitySnapshot<McpPrompt>> {
        let generation = self.generation();
        let listed = self
            .gather("prompts", |t| async move { t.list_prompts().await })
            .await;

        let mut items = Vec::new();
        let mut routes = HashMap::new();
        for (target, prompts) in listed {
            for mut prompt in prompts {
                let exposed = disambiguate(&routes, target.name(), &prompt.name);
                prompt.description = Some(tag_description(target.name(), prompt.description));
                routes.insert(
                    exposed.clone(),
                    Route {
                        target: target.name().to_string(),
                        name: std::mem::replace(&mut prompt.name, exposed),
                    },
                );
                items.push(prompt);
            }
        }

        let snapshot = Arc::new(CapabilitySnapshot {
            items,
            routes,
            generation,
        });
        self.snapshots.write().await.prompts = Some(snapshot.clone());
        snapshot
    }

    /// Merged resources. A URI served by several targets goes to the first.
    pub async fn list_resources(&self) -> Arc<CapabilitySnapshot<McpResource>> {
        let generation = self.generation();
        let listed = self
            .gather("resources", |t| async move { t.list_resources().await })
            .await;

        let mut items = Vec::new();
        let mut routes: HashMap<String, Route> = HashMap::new();
        for (target, resources) in listed {
            for mut resource in resources {
                if let Some(owner) = routes.get(&resource.uri) {
                    warn!(
                        uri = %resource.uri,
                        owner = %owner.target,
                        target_name = %target.name(),
                        "Duplicate resource, keeping the first"
                    );
                    continue;
                }
                resource.description = Some(tag_description(target.name(), resource.description));
                routes.insert(
                    resource.uri.clone(),
                    Route {
                        target: target.name().to_string(),
                        name: resource.uri.clone(),
                    },
                );
                items.push(resource);
            }
        }

        let snapshot = Arc::new(CapabilitySnapshot {
            items,
            routes,
            generation,
        });
        self.snapshots.write().await.resources = Some(snapshot.clone());
        snapshot
    }

    pub async fn list_resource_templates(&self) -> Arc<CapabilitySnapshot<McpResourceTemplate>> {
        let generation = self.generation();
        let listed = self
            .gather("resource templates", |t| async move {
                t.list_resource_templates().await
            })
            .await;

        let mut items = Vec::new();
        let mut routes: HashMap<String, Route> = HashMap::new();
        for (target, templates) in listed {
            for mut template in templates {
                if routes.contains_key(&template.uri_template) {
                    warn!(
                        uri_template = %template.uri_template,
                        target_name = %target.name(),
                        "Duplicate resource template, keeping the first"
                    );
                    continue;
                }
                template.description = Some(tag_description(target.name(), template.description));
                routes.insert(
                    template.uri_template.clone(),
                    Route {
                        target: target.name().to_string(),
                        name: template.uri_template.clone(),
                    },
                );
                items.push(template);
            }
        }

        let snapshot = Arc::new(CapabilitySnapshot {
            items,
            routes,
            generation,
        });
        self.snapshots.write().await.templates = Some(snapshot.clone());
        snapshot
    }

    /// Target a route points at. Removed and disabled targets do not serve.
    async fn route_target(&self, route: &Route, kind: &str, exposed: &str) -> GatewayResult<Arc<Target>> {
        for target in self.all_targets().await {
            if target.name() == route.target {
                if target.is_disabled().await {
                    break;
                }
                return Ok(target);
            }
        }
        debug!(workspace = %self.id, target_name = %route.target, "Route points at unavailable target");
        Err(GatewayError::unknown(kind, exposed))
    }

    async fn latest_tools(&self) -> Arc<CapabilitySnapshot<McpTool>> {
        let cached = self.snapshots.read().await.tools.clone();
        match cached {
            Some(snapshot) => snapshot,
            None => self.list_tools().await,
        }
    }

    async fn latest_prompts(&self) -> Arc<CapabilitySnapshot<McpPrompt>> {
        let cached = self.snapshots.read().await.prompts.clone();
        match cached {
            Some(snapshot) => snapshot,
            None => self.list_prompts().await,
        }
    }

    async fn latest_resources(&self) -> Arc<CapabilitySnapshot<McpResource>> {
        let cached = self.snapshots.read().await.resources.clone();
        match cached {
            Some(snapshot) => snapshot,
            None => self.list_resources().await,
        }
    }

    async fn latest_templates(&self) -> Arc<CapabilitySnapshot<McpResourceTemplate>> {
        let cached = self.snapshots.read().await.templates.clone();
        match cached {
            Some(snapshot) => snapshot,
            None => self.list_resource_templates().await,
        }
    }

    /// Route a tool call against `snapshot`.
    pub async fn call_tool_in(
        &self,
        snapshot: &CapabilitySnapshot<McpTool>,
        name: &str,
        arguments: Option<Value>,
    ) -> GatewayResult<Value> {
        let route = snapshot
            .route(name)
            .ok_or_else(|| GatewayError::unknown("tool", name))?;
        let target = self.route_target(route, "tool", name).await?;
        target.call_tool(&route.name, arguments).await
    }

    /// Route a tool call against the latest listing, relisting once when the
    /// name is unknown and the workspace changed since.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> GatewayResult<Value> {
        let mut snapshot = self.latest_tools().await;
        if snapshot.route(name).is_none() && snapshot.generation != self.generation() {
            snapshot = self.list_tools().await;
        }
        self.call_tool_in(&snapshot, name, arguments).await
    }

    pub async fn get_prompt_in(
        &self,
        snapshot: &CapabilitySnapshot<McpPrompt>,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> GatewayResult<Value> {
        let route = snapshot
            .route(name)
            .ok_or_else(|| GatewayError::unknown("prompt", name))?;
        let target = self.route_target(route, "prompt", name).await?;
        target.get_prompt(&route.name, arguments).await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> GatewayResult<Value> {
        let mut snapshot = self.latest_prompts().await;
        if snapshot.route(name).is_none() && snapshot.generation != self.generation() {
            snapshot = self.list_prompts().await;
        }
        self.get_prompt_in(&snapshot, name, arguments).await
    }

    /// Route a read by URI; URIs not listed fall back to the target whose
    /// resource template matches.
    pub async fn read_resource(&self, uri: &str) -> GatewayResult<Value> {
        let mut snapshot = self.latest_resources().await;
        if snapshot.route(uri).is_none() && snapshot.generation != self.generation() {
            snapshot = self.list_resources().await;
        }

        if let Some(route) = snapshot.route(uri) {
            let target = self.route_target(route, "resource", uri).await?;
            return target.read_resource(&route.name).await;
        }

        let templates = self.latest_templates().await;
        let matched = templates
            .items
            .iter()
            .find(|t| template_matches(&t.uri_template, uri))
            .and_then(|t| templates.route(&t.uri_template));
        match matched {
            Some(route) => {
                let target = self.route_target(route, "resource", uri).await?;
                target.read_resource(uri).await
            }
            None => Err(GatewayError::unknown("resource", uri)),
        }
    }

    pub async fn prompts(&self) -> Vec<PromptRecord> {
        self.library.list().await
    }

    pub async fn add_prompt(&self, prompt: PromptRecord) -> GatewayResult<()> {
        let _guard = self.mutation.lock().await;
        self.library.add(prompt).await?;
        self.bump();
        Ok(())
    }

    pub async fn update_prompt(&self, name: &str, prompt: PromptRecord) -> GatewayResult<()> {
        let _guard = self.mutation.lock().await;
        self.library.update(name, prompt).await?;
        self.bump();
        Ok(())
    }

    pub async fn remove_prompt(&self, name: &str) -> GatewayResult<PromptRecord> {
        let _guard = self.mutation.lock().await;
        let removed = self.library.remove(name).await?;
        self.bump();
        Ok(removed)
    }

    /// Persisted shape of the workspace.
    pub async fn to_record(&self) -> WorkspaceRecord {
        let (name, description, add_tool_prefix) = {
            let meta = self.meta.read().await;
            (meta.name.clone(), meta.description.clone(), meta.add_tool_prefix)
        };

        let mut servers = Vec::new();
        for target in self.targets.read().await.iter() {
            servers.extend(target.to_record().await);
        }

        WorkspaceRecord {
            id: self.id.clone(),
            name,
            description,
            add_tool_prefix,
            servers,
            prompts: self.library.list().await,
        }
    }

    pub async fn info(&self) -> WorkspaceInfo {
        let (name, description, add_tool_prefix) = {
            let meta = self.meta.read().await;
            (meta.name.clone(), meta.description.clone(), meta.add_tool_prefix)
        };
        WorkspaceInfo {
            id: self.id.clone(),
            name,
            description,
            add_tool_prefix,
            targets: self.targets_info().await,
            prompts: self.library.list().await,
        }
    }

    /// Close every target, the prompt library included.
    pub async fn close(&self) {
        let targets = self.all_targets().await;
        futures::future::join_all(targets.iter().map(|t| t.close())).await;
        self.bump();
        debug!(workspace = %self.id, "Workspace closed");
    }
}

/// `name` if free, else `<target>__<name>`, numbered if that is taken too.
fn disambiguate(routes: &HashMap<String, Route>, target: &str, name: &str) -> String {
    if !routes.contains_key(name) {
        return name.to_string();
    }
    let qualified = format!("{target}{PREFIX_SEPARATOR}{name}");
    if !routes.contains_key(&qualified) {
        return qualified;
    }
    (2..)
        .map(|n| format!("{qualified}_{n}"))
        .find(|candidate| !routes.contains_key(candidate))
        .unwrap_or(qualified)
}

fn tag_description(target: &str, description: Option<String>) -> String {
    match description {
        Some(description) if !description.is_empty() => format!("[{target}] {description}"),
        _ => format!("[{target}]"),
    }
}

/// Literal part of a URI template before its first variable.
fn template_matches(uri_template: &str, uri: &str) -> bool {
    let literal = uri_template
        .split_once('{')
        .map(|(head, _)| head)
        .unwrap_or(uri_template);
    !literal.is_empty() && uri.starts_with(literal)
}

#[async_trait]
impl McpHandler for Workspace {
    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: format!("switchboard/{}", self.id),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, JsonRpcError> {
        Ok(Workspace::list_tools(self).await.items.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<Value, JsonRpcError> {
        Workspace::call_tool(self, name, arguments)
            .await
            .map_err(|e| e.to_json_rpc())
    }

    async fn list_prompts(&self) -> Result<Vec<McpPrompt>, JsonRpcError> {
        Ok(Workspace::list_prompts(self).await.items.clone())
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<Value, JsonRpcError> {
        Workspace::get_prompt(self, name, arguments)
            .await
            .map_err(|e| e.to_json_rpc())
    }

    async fn list_resources(&self) -> Result<Vec<McpResource>, JsonRpcError> {
        Ok(Workspace::list_resources(self).await.items.clone())
    }

    async fn list_resource_templates(&self) -> Result<Vec<McpResourceTemplate>, JsonRpcError> {
        Ok(Workspace::list_resource_templates(self).await.items.clone())
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, JsonRpcError> {
        Workspace::read_resource(self, uri)
            .await
            .map_err(|e| e.to_json_rpc())
    }
}
