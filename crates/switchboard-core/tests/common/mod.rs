//! Shared helpers for the gateway integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{GatewaySettings, Workspace};
use switchboard_storage::{ServerRecord, WorkspaceRecord};

/// Minimal MCP server over stdio. `$1` is the server name, the remaining
/// arguments are the tool names it offers. Calling a tool answers
/// `<server>:<tool>`.
///
/// Every stub also offers the resources `file:///shared.txt` and
/// `file:///<server>.txt` plus the template `<server>://{path}`; reading any
/// URI answers `<server>:<uri>`.
const STUB_SERVER: &str = r#"
name="$1"; shift
tools=""
for t in "$@"; do
  [ -n "$tools" ] && tools="$tools,"
  tools="$tools{\"name\":\"$t\",\"description\":\"$t from $name\",\"inputSchema\":{\"type\":\"object\"}}"
done
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{},"resources":{}},"serverInfo":{"name":"%s","version":"1.0.0"}}}\n' "$id" "$name" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[%s]}}\n' "$id" "$tools" ;;
    *'"method":"resources/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"resources":[{"uri":"file:///shared.txt","name":"shared","description":"shared from %s"},{"uri":"file:///%s.txt","name":"%s"}]}}\n' "$id" "$name" "$name" "$name" ;;
    *'"method":"resources/templates/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"resourceTemplates":[{"uriTemplate":"%s://{path}","name":"%s files"}]}}\n' "$id" "$name" "$name" ;;
    *'"method":"resources/read"'*)
      uri=$(printf '%s\n' "$line" | sed -n 's/.*"uri":"\([^"]*\)".*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"contents":[{"uri":"%s","text":"%s:%s"}]}}\n' "$id" "$uri" "$name" "$uri" ;;
    *'"method":"tools/call"'*)
      tool=$(printf '%s\n' "$line" | sed -n 's/.*"params":{.*"name":"\([^"]*\)".*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s:%s"}]}}\n' "$id" "$name" "$tool" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id" ;;
  esac
done
"#;

/// Arguments for `sh` to run the stub server.
pub fn stub_args(name: &str, tools: &[&str]) -> Vec<String> {
    let mut args = vec![
        "-c".to_string(),
        STUB_SERVER.to_string(),
        "stub".to_string(),
        name.to_string(),
    ];
    args.extend(tools.iter().map(|t| t.to_string()));
    args
}

/// A process target running the stub server.
pub fn stub(name: &str, tools: &[&str]) -> ServerRecord {
    ServerRecord::stdio(name, "sh", stub_args(name, tools))
}

pub fn settings() -> GatewaySettings {
    GatewaySettings {
        request_timeout: Duration::from_secs(10),
        ..GatewaySettings::default()
    }
}

/// An empty, connected workspace.
pub async fn workspace(id: &str) -> Arc<Workspace> {
    Workspace::from_record(&WorkspaceRecord::new(id, id), settings(), None, true)
        .await
        .expect("Failed to create workspace")
}

/// Exposed tool names in listing order.
pub async fn tool_names(workspace: &Workspace) -> Vec<String> {
    workspace
        .list_tools()
        .await
        .items
        .iter()
        .map(|t| t.name.clone())
        .collect()
}

/// Text of the first content block of a tool result.
pub fn text(result: &serde_json::Value) -> String {
    result["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
