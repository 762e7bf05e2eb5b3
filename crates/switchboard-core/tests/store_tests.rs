//! Workspace store tests: lifecycle and persistence.

mod common;

use common::{settings, stub, stub_args, tool_names};
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::{
    OAuthCoordinator, ParameterScope, RegistryEntry, RegistryParameter, StaticRegistry,
    TargetStatus, WorkspacePatch, WorkspaceStore,
};
use switchboard_storage::{
    ConfigStore, JsonConfigStore, MemoryConfigStore, PromptMessageRecord, PromptRecord,
    ServerRecord, TransportRecord, WorkspaceRecord,
};
use tempfile::TempDir;

fn coordinator() -> Arc<OAuthCoordinator> {
    Arc::new(OAuthCoordinator::new("http://127.0.0.1:3282/oauth/callback"))
}

async fn memory_store() -> (Arc<MemoryConfigStore>, WorkspaceStore) {
    let config = Arc::new(MemoryConfigStore::new());
    let store = WorkspaceStore::bootstrap(config.clone(), coordinator(), settings())
        .await
        .expect("Failed to bootstrap store");
    (config, store)
}

fn greeting() -> PromptRecord {
    PromptRecord {
        name: "greet".to_string(),
        description: None,
        arguments: Vec::new(),
        messages: vec![PromptMessageRecord {
            role: "user".to_string(),
            text: "hello".to_string(),
        }],
    }
}

/// Ids are slugs of the name and stay unique.
#[tokio::test]
async fn test_create_allocates_unique_ids() {
    let (config, store) = memory_store().await;

    let first = store.create("My Tools", None).await.expect("Failed to create");
    let second = store
        .create("my tools", Some("second".to_string()))
        .await
        .expect("Failed to create");
    assert_eq!(first.id(), "my-tools");
    assert_eq!(second.id(), "my-tools-2");

    let persisted = config.get("my-tools-2").await.expect("Not persisted");
    assert_eq!(persisted.name, "my tools");
    assert_eq!(persisted.description.as_deref(), Some("second"));

    let ids: Vec<_> = store.list().await.iter().map(|w| w.id().to_string()).collect();
    assert_eq!(ids, vec!["my-tools", "my-tools-2"]);

    let error = store.create("  ", None).await.unwrap_err();
    assert_eq!(error.code(), "BAD_REQUEST");
    store.close().await;
}

/// Deleting closes the workspace and forgets it.
#[tokio::test]
async fn test_delete() {
    let (config, store) = memory_store().await;
    let ws = store.create("doomed", None).await.unwrap();
    let target = store.add_target("doomed", stub("foo", &["foo"]), true).await.unwrap();
    assert_eq!(target.status().await, TargetStatus::Connected);

    store.delete("doomed").await.expect("Failed to delete");
    assert_eq!(target.status().await, TargetStatus::Disconnected);
    assert!(config.get("doomed").await.is_none());
    assert!(tool_names(&ws).await.is_empty());

    let error = store.get("doomed").await.unwrap_err();
    assert_eq!(error.code(), "NOT_FOUND");
    let error = store.delete("doomed").await.unwrap_err();
    assert_eq!(error.code(), "NOT_FOUND");
}

/// Target and workspace mutations reach the config store.
#[tokio::test]
async fn test_mutations_are_persisted() {
    let (config, store) = memory_store().await;
    store.create("dev", None).await.unwrap();

    store.add_target("dev", stub("foo", &["foo"]), true).await.unwrap();
    assert_eq!(config.get("dev").await.unwrap().servers.len(), 1);

    // A failed add leaves the persisted record alone
    let error = store
        .add_target("dev", stub("FOO", &["bar"]), true)
        .await
        .unwrap_err();
    assert_eq!(error.code(), "DUPLICATE");
    assert_eq!(config.get("dev").await.unwrap().servers.len(), 1);

    store
        .update_workspace(
            "dev",
            WorkspacePatch {
                name: Some("Development".to_string()),
                add_tool_prefix: Some(true),
                ..WorkspacePatch::default()
            },
        )
        .await
        .unwrap();
    let record = config.get("dev").await.unwrap();
    assert_eq!(record.name, "Development");
    assert!(record.add_tool_prefix);

    store.remove_target("dev", "foo").await.unwrap();
    assert!(config.get("dev").await.unwrap().servers.is_empty());
    store.close().await;
}

/// Prompt CRUD goes through the store.
#[tokio::test]
async fn test_prompt_crud_is_persisted() {
    let (config, store) = memory_store().await;
    store.create("dev", None).await.unwrap();

    store.add_prompt("dev", greeting()).await.unwrap();
    assert_eq!(config.get("dev").await.unwrap().prompts, vec![greeting()]);

    let error = store.add_prompt("dev", greeting()).await.unwrap_err();
    assert_eq!(error.code(), "DUPLICATE");

    let mut renamed = greeting();
    renamed.name = "welcome".to_string();
    store.update_prompt("dev", "greet", renamed.clone()).await.unwrap();
    assert_eq!(config.get("dev").await.unwrap().prompts, vec![renamed]);

    let removed = store.remove_prompt("dev", "welcome").await.unwrap();
    assert_eq!(removed.name, "welcome");
    assert!(config.get("dev").await.unwrap().prompts.is_empty());
    store.close().await;
}

/// A change the config store rejects is not left behind in the live workspace.
#[tokio::test]
async fn test_unsaved_changes_are_rolled_back() {
    let (config, store) = memory_store().await;
    let workspace = store.create("dev", None).await.unwrap();
    store.add_prompt("dev", greeting()).await.unwrap();

    // Updates of an unknown id fail in the backend
    let saved = config.get("dev").await.unwrap();
    config.delete_proxy("dev").await.unwrap();

    assert!(store.add_target("dev", stub("foo", &["foo"]), true).await.is_err());
    assert!(workspace.targets().await.is_empty());

    let patch = WorkspacePatch {
        name: Some("Renamed".to_string()),
        add_tool_prefix: Some(true),
        ..WorkspacePatch::default()
    };
    assert!(store.update_workspace("dev", patch).await.is_err());
    let info = workspace.info().await;
    assert_eq!(info.name, "dev");
    assert!(!info.add_tool_prefix);

    let mut other = greeting();
    other.name = "other".to_string();
    assert!(store.add_prompt("dev", other).await.is_err());
    assert!(store.remove_prompt("dev", "greet").await.is_err());
    assert_eq!(workspace.prompts().await, vec![greeting()]);

    // Once the backend accepts writes again a retry goes through
    config.add_proxy(&saved).await.unwrap();
    store
        .add_target("dev", stub("foo", &["foo"]), true)
        .await
        .expect("Failed to add target after restore");
    assert_eq!(config.get("dev").await.unwrap().servers.len(), 1);

    config.delete_proxy("dev").await.unwrap();
    assert!(store.remove_target("dev", "foo").await.is_err());
    assert_eq!(workspace.targets().await.len(), 1);
    store.close().await;
}

/// Client links require an existing workspace.
#[tokio::test]
async fn test_client_links() {
    let (config, store) = memory_store().await;
    store.create("dev", None).await.unwrap();

    store.link_client("cursor", "dev").await.expect("Failed to link");
    let links = config.client_links().await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].client, "cursor");
    assert_eq!(links[0].workspace_id, "dev");

    let error = store.link_client("cursor", "missing").await.unwrap_err();
    assert_eq!(error.code(), "NOT_FOUND");

    store.unlink_client("cursor").await.unwrap();
    assert!(config.client_links().await.unwrap().is_empty());
}

/// Registry entries are instantiated into process targets.
#[tokio::test]
async fn test_add_from_registry() {
    let (config, store) = memory_store().await;
    let registry = StaticRegistry::new([RegistryEntry {
        name: "stub-server".to_string(),
        description: None,
        transport: TransportRecord::Stdio {
            command: "sh".to_string(),
            args: stub_args("mine", &["run"]),
            env: HashMap::new(),
        },
        parameters: vec![RegistryParameter {
            name: "TOKEN".to_string(),
            scope: ParameterScope::Env,
            required: true,
            description: None,
        }],
    }]);
    let store = store.with_registry(Arc::new(registry));
    store.create("dev", None).await.unwrap();

    let error = store
        .add_from_registry("dev", "stub-server", "mine", &HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(error.code(), "BAD_REQUEST");

    let values = HashMap::from([("TOKEN".to_string(), "secret".to_string())]);
    let target = store
        .add_from_registry("dev", "stub-server", "mine", &values)
        .await
        .expect("Failed to install");
    assert_eq!(target.name(), "mine");
    assert_eq!(target.status().await, TargetStatus::Connected);

    let record = config.get("dev").await.unwrap();
    assert_eq!(record.servers[0].source.as_deref(), Some("registry:stub-server"));
    match &record.servers[0].transport {
        TransportRecord::Stdio { env, .. } => assert_eq!(env["TOKEN"], "secret"),
        other => panic!("unexpected transport {other:?}"),
    }

    let error = store
        .add_from_registry("dev", "unknown", "x", &values)
        .await
        .unwrap_err();
    assert_eq!(error.code(), "NOT_FOUND");
    store.close().await;
}

/// A target that cannot start does not stop the workspace from loading.
#[tokio::test]
async fn test_bootstrap_keeps_failed_targets() {
    let mut record = WorkspaceRecord::new("dev", "Dev");
    record.servers.push(stub("good", &["ok"]));
    record
        .servers
        .push(ServerRecord::stdio("bad", "switchboard-test-missing-binary", vec![]));
    let config = Arc::new(MemoryConfigStore::with_records([record]));

    let store = WorkspaceStore::bootstrap(config, coordinator(), settings())
        .await
        .expect("Bootstrap should not fail");
    let ws = store.get("dev").await.unwrap();

    let bad = ws.target("bad").await.unwrap();
    assert_eq!(bad.status().await, TargetStatus::Error);
    let good = ws.target("good").await.unwrap();
    assert_eq!(good.status().await, TargetStatus::Connected);
    assert_eq!(tool_names(&ws).await, vec!["ok"]);
    store.close().await;
}

/// Workspaces survive a restart with the JSON backend.
#[tokio::test]
async fn test_json_backend_round_trip() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    {
        let config = Arc::new(JsonConfigStore::new(dir.path()));
        let store = WorkspaceStore::bootstrap(config, coordinator(), settings())
            .await
            .unwrap();
        store.create("Persisted", None).await.unwrap();
        store
            .add_target("persisted", stub("foo", &["foo"]), true)
            .await
            .unwrap();
        store.add_prompt("persisted", greeting()).await.unwrap();
        store.close().await;
    }

    let config = Arc::new(JsonConfigStore::new(dir.path()));
    let store = WorkspaceStore::bootstrap(config, coordinator(), settings())
        .await
        .expect("Failed to reload");
    let ws = store.get("persisted").await.unwrap();
    assert_eq!(ws.name().await, "Persisted");
    assert_eq!(tool_names(&ws).await, vec!["foo"]);
    assert_eq!(ws.prompts().await, vec![greeting()]);
    store.close().await;
}
