//! MCP stdio transport (§6.1, out of scope as a *protocol*, but the server needs a concrete
//! binding): JSON-RPC 2.0 framed as newline-delimited JSON on stdin/stdout. Exposes a single
//! tool whose arguments are the [`Thought`] schema. Mirrors this codebase's existing
//! stdio JSON-RPC loop almost line for line, since the framing itself is a pinned collaborator.

use crate::handler::RequestHandler;
use gan_core::{Diagnostic, GanError, Thought};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const TOOL_NAME: &str = "gan_audit_thought";

#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Diagnostic>,
}

#[derive(Serialize)]
struct McpToolDef {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

fn thought_tool_def() -> McpToolDef {
    McpToolDef {
        name: TOOL_NAME.to_string(),
        description: "Submit a thought for iterative, adversarial code-quality auditing.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "thought": { "type": "string" },
                "thoughtNumber": { "type": "integer", "minimum": 1 },
                "totalThoughts": { "type": "integer", "minimum": 1 },
                "nextThoughtNeeded": { "type": "boolean" },
                "branchId": { "type": "string" },
                "loopId": { "type": "string" },
                "isRevision": { "type": "boolean" },
                "revisesThought": { "type": "integer" },
                "branchFromThought": { "type": "integer" }
            },
            "required": ["thought", "thoughtNumber", "totalThoughts", "nextThoughtNeeded"]
        }),
    }
}

/// Run the stdio JSON-RPC loop until stdin closes or `shutdown` fires. Every accepted
/// `tools/call` gets its own `CancellationToken` child so a transport-level shutdown can
/// cancel an in-flight audit without tearing down the whole server.
pub async fn run_stdio_server(handler: Arc<RequestHandler>, shutdown: CancellationToken) -> anyhow::Result<()> {
    info!("starting MCP server on stdio");

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("stdio transport shutting down");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            info!("stdin closed, MCP server shutting down");
            break;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!(request = trimmed, "received MCP request");

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "failed to parse JSON-RPC request");
                let response = JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    result: None,
                    error: Some(JsonRpcError { code: -32700, message: format!("parse error: {e}"), data: None }),
                    id: None,
                };
                write_response(&mut stdout, &response).await?;
                continue;
            }
        };

        let response = handle_request(&handler, request, shutdown.child_token()).await;
        if let Some(response) = response {
            write_response(&mut stdout, &response).await?;
        }
    }

    Ok(())
}

async fn handle_request(
    handler: &Arc<RequestHandler>,
    request: JsonRpcRequest,
    cancel: CancellationToken,
) -> Option<JsonRpcResponse> {
    let id = request.id.clone();

    match request.method.as_str() {
        "initialize" => Some(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "gan-mcp", "version": env!("CARGO_PKG_VERSION") },
            })),
            error: None,
            id,
        }),
        "notifications/initialized" => None,
        "tools/list" => Some(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(serde_json::json!({ "tools": [thought_tool_def()] })),
            error: None,
            id,
        }),
        "tools/call" => Some(match handle_tool_call(handler, request.params, cancel).await {
            Ok(result) => JsonRpcResponse { jsonrpc: "2.0".to_string(), result: Some(result), error: None, id },
            Err(diag) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                result: None,
                error: Some(JsonRpcError { code: -32000, message: diag.message.clone(), data: Some(diag) }),
                id,
            },
        }),
        "shutdown" => Some(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(serde_json::json!({})),
            error: None,
            id,
        }),
        other => Some(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code: -32601, message: format!("method not found: {other}"), data: None }),
            id,
        }),
    }
}

async fn handle_tool_call(
    handler: &Arc<RequestHandler>,
    params: Option<Value>,
    cancel: CancellationToken,
) -> Result<Value, Diagnostic> {
    let params = params.ok_or_else(|| Diagnostic::from(GanError::Validation("missing params for tools/call".into())))?;
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Diagnostic::from(GanError::Validation("missing tool name".into())))?;

    if name != TOOL_NAME {
        return Err(GanError::Validation(format!("unknown tool: {name}")).into());
    }

    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    let thought: Thought = serde_json::from_value(arguments)
        .map_err(|e| Diagnostic::from(GanError::Validation(format!("malformed thought arguments: {e}"))))?;

    let outcome = handler.handle(thought, cancel).await?;

    let mut text = serde_json::to_string_pretty(&outcome.envelope)
        .map_err(|e| Diagnostic::from(GanError::Validation(format!("failed to encode response envelope: {e}"))))?;

    if let Some(feedback) = &outcome.feedback {
        let feedback_json = serde_json::to_string_pretty(feedback)
            .map_err(|e| Diagnostic::from(GanError::Validation(format!("failed to encode feedback document: {e}"))))?;
        text.push_str("\n\n---\n");
        text.push_str(&feedback_json);
    }

    Ok(serde_json::json!({
        "content": [{ "type": "text", "text": text }]
    }))
}

async fn write_response(stdout: &mut tokio::io::Stdout, response: &JsonRpcResponse) -> anyhow::Result<()> {
    let encoded = serde_json::to_string(response)?;
    stdout.write_all(encoded.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thought_tool_def_requires_core_fields() {
        let def = thought_tool_def();
        assert_eq!(def.name, TOOL_NAME);
        let required = def.input_schema.get("required").unwrap().as_array().unwrap();
        let required: Vec<&str> = required.iter().map(|v| v.as_str().unwrap()).collect();
        assert!(required.contains(&"thought"));
        assert!(required.contains(&"nextThoughtNeeded"));
    }
}
