//! Gateway core for switchboard.
//!
//! This crate turns many upstream MCP servers into one:
//! - Targets: one connection per upstream (process, network, in-process)
//! - Workspaces: merged listings and routed calls across targets
//! - OAuth coordination shared by every workspace
//! - The embedded prompt library and controller tools
//! - The workspace store, backed by a `ConfigStore`

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod prompts;
pub mod registry;
pub mod retry;
pub mod store;
pub mod target;
pub mod workspace;

pub use config::{GatewayConfig, GatewaySettings};
pub use coordinator::{OAuthCoordinator, OAuthRegistration};
pub use error::{GatewayError, GatewayResult};
pub use prompts::PromptLibrary;
pub use registry::{
    HttpRegistryClient, ParameterScope, RegistryClient, RegistryEntry, RegistryParameter,
    StaticRegistry,
};
pub use retry::ReconnectPolicy;
pub use store::WorkspaceStore;
pub use target::{
    ConnectOutcome, Target, TargetInfo, TargetKind, TargetPatch, TargetSettings, TargetState,
    TargetStatus,
};
pub use workspace::{CapabilitySnapshot, Route, Workspace, WorkspaceInfo, WorkspacePatch};
