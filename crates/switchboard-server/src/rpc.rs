//! JSON-RPC message handling shared by both session adapters.

use serde_json::{json, Value};
use switchboard_mcp::protocol::error_codes;
use switchboard_mcp::{handle_request, JsonRpcRequest, McpHandler};
use tracing::{debug, warn};

/// Parse a request body.
///
/// On failure returns the JSON-RPC parse error to send back.
pub(crate) fn parse_body(body: &[u8]) -> Result<Value, Value> {
    serde_json::from_slice(body)
        .map_err(|e| error_value(Value::Null, error_codes::PARSE_ERROR, format!("Parse error: {e}")))
}

/// Answer one message or a batch.
///
/// Returns `None` when nothing needs answering: notifications and
/// client-side responses.
pub(crate) async fn dispatch(handler: &dyn McpHandler, message: Value) -> Option<Value> {
    match message {
        Value::Array(batch) if batch.is_empty() => Some(error_value(
            Value::Null,
            error_codes::INVALID_REQUEST,
            "Invalid Request: empty batch",
        )),
        Value::Array(batch) => {
            let mut replies = Vec::new();
            for item in batch {
                if let Some(reply) = dispatch_one(handler, item).await {
                    replies.push(reply);
                }
            }
            (!replies.is_empty()).then_some(Value::Array(replies))
        }
        single => dispatch_one(handler, single).await,
    }
}

async fn dispatch_one(handler: &dyn McpHandler, message: Value) -> Option<Value> {
    let id = message.get("id").cloned().unwrap_or(Value::Null);

    if message.get("method").is_none() {
        if message.get("result").is_some() || message.get("error").is_some() {
            debug!(id = %id, "Ignoring client response");
            return None;
        }
        return Some(error_value(id, error_codes::INVALID_REQUEST, "Invalid Request"));
    }

    let request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            return Some(error_value(
                id,
                error_codes::INVALID_REQUEST,
                format!("Invalid Request: {e}"),
            ))
        }
    };

    let response = handle_request(handler, request).await?;
    match serde_json::to_value(&response) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Failed to serialize response");
            Some(error_value(id, error_codes::INTERNAL_ERROR, "Internal error"))
        }
    }
}

/// Whether the message (or any message of a batch) is `initialize`.
pub(crate) fn is_initialize(message: &Value) -> bool {
    match message {
        Value::Array(batch) => batch.iter().any(is_initialize),
        single => single.get("method").and_then(Value::as_str) == Some("initialize"),
    }
}

pub(crate) fn error_value(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
}
