//! Error types for the gateway core.

use serde_json::{json, Value};
use switchboard_mcp::protocol::error_codes;
use switchboard_mcp::{JsonRpcError, McpError};
use switchboard_storage::StorageError;
use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway errors. Every variant carries a stable machine-readable code,
/// see [`GatewayError::code`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A workspace, target, prompt, tool or resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A name is already taken.
    #[error("{0}")]
    Duplicate(String),

    /// The request itself is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// An upstream could not be started or reached.
    #[error("{0}")]
    ConnectionRefused(String),

    /// An upstream requires authorization that has not been granted.
    #[error("{0}")]
    Unauthorized(String),

    /// A persisted or submitted configuration is unusable.
    #[error("{0}")]
    InvalidConfiguration(String),

    /// The tool exists but is disabled on its target.
    #[error("{0}")]
    ToolDisabled(String),

    /// An upstream request exceeded the per-call timeout.
    #[error("{0}")]
    Timeout(String),

    /// An upstream answered with a JSON-RPC error.
    #[error("upstream error {code}: {message}")]
    Upstream {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// I/O, serialization or storage failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// `Unknown <kind>: <name>`
    pub fn unknown(kind: &str, name: &str) -> Self {
        Self::NotFound(format!("Unknown {kind}: {name}"))
    }

    /// Stable code for callers that branch on the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::Duplicate(_) => "DUPLICATE",
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::ConnectionRefused(_) => "CONNECTION_REFUSED",
            GatewayError::Unauthorized(_) => "UNAUTHORIZED",
            GatewayError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            GatewayError::ToolDisabled(_) => "TOOL_DISABLED",
            GatewayError::Timeout(_) => "TIMEOUT",
            GatewayError::Upstream { .. } => "UPSTREAM",
            GatewayError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status for front ends.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::NotFound(_) => 404,
            GatewayError::BadRequest(_) | GatewayError::InvalidConfiguration(_) => 400,
            GatewayError::Duplicate(_) => 409,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::ConnectionRefused(_) => 502,
            GatewayError::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// JSON-RPC form, with the stable code in `data.code`.
    ///
    /// Upstream errors keep their original code and message.
    pub fn to_json_rpc(&self) -> JsonRpcError {
        let rpc_code = match self {
            GatewayError::Upstream { code, .. } => *code,
            GatewayError::NotFound(_)
            | GatewayError::BadRequest(_)
            | GatewayError::ToolDisabled(_) => error_codes::INVALID_PARAMS,
            _ => error_codes::INTERNAL_ERROR,
        };

        let message = match self {
            GatewayError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let mut data = match self {
            GatewayError::Upstream {
                data: Some(Value::Object(map)),
                ..
            } => Value::Object(map.clone()),
            GatewayError::Upstream { data: Some(other), .. } => json!({ "upstream": other }),
            _ => json!({}),
        };
        data["code"] = json!(self.code());

        JsonRpcError::new(rpc_code, message).with_data(data)
    }
}

impl From<McpError> for GatewayError {
    fn from(error: McpError) -> Self {
        match error {
            McpError::Rpc {
                code,
                message,
                data,
            } => GatewayError::Upstream {
                code,
                message,
                data,
            },
            McpError::Timeout => GatewayError::Timeout("upstream request timed out".to_string()),
            McpError::AuthRequired | McpError::AuthFailed(_) => {
                GatewayError::Unauthorized(error.to_string())
            }
            McpError::CommandNotFound(_)
            | McpError::ConnectionFailed(_)
            | McpError::ProcessError(_)
            | McpError::Closed
            | McpError::Io(_)
            | McpError::Http(_) => GatewayError::ConnectionRefused(error.to_string()),
            McpError::ProtocolError(_)
            | McpError::InitializationFailed(_)
            | McpError::Json(_) => GatewayError::Internal(error.to_string()),
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(id) => GatewayError::NotFound(format!("Unknown workspace: {id}")),
            StorageError::AlreadyExists(id) => {
                GatewayError::Duplicate(format!("Workspace '{id}' already exists"))
            }
            StorageError::InvalidRecord { .. } | StorageError::InvalidKey(_) => {
                GatewayError::InvalidConfiguration(error.to_string())
            }
            StorageError::Io(_) | StorageError::Json(_) => GatewayError::Internal(error.to_string()),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(error: std::io::Error) -> Self {
        GatewayError::Internal(error.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::Internal(error.to_string())
    }
}
