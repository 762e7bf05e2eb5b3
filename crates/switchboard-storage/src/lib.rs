//! Persisted configuration for switchboard.
//!
//! Workspaces are stored as self-contained records (id, name, description,
//! servers, prompts). The gateway core only ever talks to a [`ConfigStore`];
//! two backends are provided:
//! - JSON files, one per workspace (default)
//! - In-memory (for testing and embedding)

pub mod error;
pub mod json;
pub mod memory;
pub mod record;

pub use error::{StorageError, StorageResult};
pub use json::JsonConfigStore;
pub use memory::MemoryConfigStore;
pub use record::{
    ClientLink, PromptArgumentRecord, PromptMessageRecord, PromptRecord, ServerRecord,
    TransportRecord, WorkspaceRecord,
};

use async_trait::async_trait;

/// The durable home of workspace definitions.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load every persisted workspace, ordered by id.
    ///
    /// Records failing validation are reported as [`StorageError::InvalidRecord`].
    async fn get_all(&self) -> StorageResult<Vec<WorkspaceRecord>>;

    /// Persist a new workspace. Fails if the id is already stored.
    async fn add_proxy(&self, record: &WorkspaceRecord) -> StorageResult<()>;

    /// Overwrite an existing workspace. Fails if the id is unknown.
    async fn update_proxy(&self, record: &WorkspaceRecord) -> StorageResult<()>;

    /// Delete a workspace. Deleting an unknown id is not an error.
    async fn delete_proxy(&self, id: &str) -> StorageResult<()>;

    /// Point an installer client at a workspace.
    async fn set_workspace(&self, client: &str, workspace_id: &str) -> StorageResult<()>;

    /// Forget which workspace an installer client uses.
    async fn unset_workspace(&self, client: &str) -> StorageResult<()>;

    /// All client links, ordered by client name.
    async fn client_links(&self) -> StorageResult<Vec<ClientLink>>;
}
