//! Model Context Protocol (MCP) plumbing for switchboard.
//!
//! This crate knows how to talk to exactly one upstream MCP server at a time.
//! Aggregation across servers lives in `switchboard-core`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────────────────────────────────┐
//! │  McpClient   │───►│ dyn Transport                             │
//! │ (initialize, │    │  ├─ StdioTransport      (child process)   │
//! │  list, call, │    │  ├─ StreamableTransport (HTTP POST + SSE) │
//! │  timeouts)   │    │  ├─ LegacySseTransport  (GET /sse + POST) │
//! └──────────────┘    │  └─ MemoryTransport     (dyn McpHandler)  │
//!                     └───────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchboard_mcp::{ClientOptions, McpClient, StdioConfig, StdioTransport};
//!
//! # async fn example() -> switchboard_mcp::McpResult<()> {
//! let config = StdioConfig::new("my-mcp-server");
//! let transport = Arc::new(StdioTransport::spawn(&config)?);
//! let client = McpClient::connect("local", transport, ClientOptions::default()).await?;
//! for tool in client.list_tools().await? {
//!     println!("{}", tool.name);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod memory;
pub mod oauth;
pub mod protocol;
pub mod serve;
pub mod sse;
pub mod stdio;
pub mod streamable;
mod transport;

pub use client::{ClientOptions, McpClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::{McpError, McpResult};
pub use memory::MemoryTransport;
pub use protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpPrompt, McpResource,
    McpResourceTemplate, McpTool, RequestId, ServerCapabilities, ServerInfo, ToolCallResult,
    ToolContent,
};
pub use serve::{handle_request, McpHandler};
pub use sse::{LegacySseTransport, SseEvent, SseParser};
pub use stdio::{StdioConfig, StdioTransport};
pub use streamable::{HttpConfig, StreamableTransport, SESSION_HEADER};
pub use transport::{PendingRequests, Transport};
