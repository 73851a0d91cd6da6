//! Minimal Model Context Protocol client over streamable HTTP.
//!
//! Only what a tool-calling source needs: the `initialize` handshake,
//! `tools/call`, and session teardown. Responses may arrive as plain JSON or
//! as server-sent events carrying JSON-RPC messages on `data:` lines.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::contract::BoxFuture;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::DslError;

pub const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT: &str = "application/json, text/event-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpErrorKind {
    /// No response: connect failure or client-side timeout.
    Transport,
    /// Non-2xx HTTP status.
    Status(u16),
    /// Response was not a JSON-RPC message we understand.
    Protocol,
    /// JSON-RPC `error` object.
    Rpc(i64),
    /// Tool result flagged with `isError`.
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpError {
    kind: McpErrorKind,
    message: String,
}

impl McpError {
    pub fn new(kind: McpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::Tool, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::Protocol, message)
    }

    pub const fn kind(&self) -> &McpErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for McpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for McpError {}

impl From<McpError> for DslError {
    fn from(error: McpError) -> Self {
        match error.kind {
            McpErrorKind::Transport => DslError::network(error.message),
            McpErrorKind::Status(status) => {
                match HttpResponse::new(status, error.message).error_for_status() {
                    Err(mapped) => mapped,
                    Ok(()) => DslError::invalid_response("unexpected mcp status"),
                }
            }
            McpErrorKind::Protocol | McpErrorKind::Rpc(_) | McpErrorKind::Tool => {
                DslError::invalid_response(error.message)
            }
        }
    }
}

/// An open MCP session.
pub trait McpSession: Send + Sync {
    /// Invokes a tool and returns its JSON payload.
    fn call_tool<'a>(&'a self, name: &'a str, arguments: Value)
        -> BoxFuture<'a, Result<Value, McpError>>;

    /// Ends the session. Failures are logged and swallowed.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Opens sessions against an MCP server endpoint.
pub trait McpConnector: Send + Sync {
    fn connect(&self, endpoint: String) -> BoxFuture<'_, Result<Box<dyn McpSession>, McpError>>;
}

/// Streamable-HTTP connector built on an [`HttpClient`].
#[derive(Clone)]
pub struct HttpMcpConnector {
    http: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl HttpMcpConnector {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self { http, timeout_ms }
    }
}

impl McpConnector for HttpMcpConnector {
    fn connect(&self, endpoint: String) -> BoxFuture<'_, Result<Box<dyn McpSession>, McpError>> {
        Box::pin(async move {
            let initialize = json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "marketdsl",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                },
            });

            let response = post_json(&*self.http, &endpoint, None, &initialize, self.timeout_ms)
                .await?;
            let session_id = response.header(SESSION_HEADER).map(str::to_owned);
            let message = extract_message(&response.body, 0)?;
            rpc_result(message)?;
            debug!(endpoint = %endpoint, session = ?session_id, "mcp session initialized");

            let initialized = json!({
                "jsonrpc": "2.0",
                "method": "notifications/initialized",
            });
            post_json(
                &*self.http,
                &endpoint,
                session_id.as_deref(),
                &initialized,
                self.timeout_ms,
            )
            .await?;

            let session: Box<dyn McpSession> = Box::new(HttpMcpSession {
                http: Arc::clone(&self.http),
                endpoint,
                session_id,
                next_id: AtomicU64::new(1),
                timeout_ms: self.timeout_ms,
            });
            Ok(session)
        })
    }
}

struct HttpMcpSession {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    session_id: Option<String>,
    next_id: AtomicU64,
    timeout_ms: u64,
}

impl McpSession for HttpMcpSession {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
    ) -> BoxFuture<'a, Result<Value, McpError>> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let request = json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "tools/call",
                "params": { "name": name, "arguments": arguments },
            });

            let response = post_json(
                &*self.http,
                &self.endpoint,
                self.session_id.as_deref(),
                &request,
                self.timeout_ms,
            )
            .await?;
            let message = extract_message(&response.body, id)?;
            tool_payload(rpc_result(message)?)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let Some(session_id) = self.session_id.as_deref() else {
                return;
            };

            let request = HttpRequest::delete(&self.endpoint)
                .with_header(SESSION_HEADER, session_id)
                .with_timeout_ms(self.timeout_ms);
            if let Err(error) = self.http.execute(request).await {
                debug!(endpoint = %self.endpoint, "mcp session delete failed: {error}");
            }
        })
    }
}

async fn post_json(
    http: &dyn HttpClient,
    endpoint: &str,
    session_id: Option<&str>,
    body: &Value,
    timeout_ms: u64,
) -> Result<HttpResponse, McpError> {
    let mut request = HttpRequest::post(endpoint)
        .with_header("accept", ACCEPT)
        .with_json_body(body)
        .with_timeout_ms(timeout_ms);
    if let Some(session_id) = session_id {
        request = request.with_header(SESSION_HEADER, session_id);
    }

    let response = http
        .execute(request)
        .await
        .map_err(|error| McpError::new(McpErrorKind::Transport, error.message()))?;

    if !response.is_success() {
        return Err(McpError::new(
            McpErrorKind::Status(response.status),
            response.body.trim().to_owned(),
        ));
    }

    Ok(response)
}

/// Finds the JSON-RPC message answering `id` in a JSON or SSE body.
pub(crate) fn extract_message(body: &str, id: u64) -> Result<Value, McpError> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| McpError::protocol(format!("invalid json-rpc body: {e}")));
    }

    let mut data = String::new();
    let mut found = None;
    for line in trimmed.lines().chain(std::iter::once("")) {
        if let Some(chunk) = line.strip_prefix("data:") {
            data.push_str(chunk.trim_start());
            continue;
        }

        if line.trim().is_empty() && !data.is_empty() {
            if let Ok(message) = serde_json::from_str::<Value>(&data) {
                if message.get("id").and_then(Value::as_u64) == Some(id) {
                    found = Some(message);
                    break;
                }
            }
            data.clear();
        }
    }

    found.ok_or_else(|| McpError::protocol(format!("no json-rpc response for id {id}")))
}

fn rpc_result(message: Value) -> Result<Value, McpError> {
    if let Some(error) = message.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown json-rpc error");
        return Err(McpError::new(McpErrorKind::Rpc(code), text));
    }

    message
        .get("result")
        .cloned()
        .ok_or_else(|| McpError::protocol("json-rpc response has neither result nor error"))
}

/// Unwraps a `tools/call` result into the tool's JSON payload.
///
/// Prefers `structuredContent`; otherwise the first text block is parsed as
/// JSON, falling back to the raw string.
pub(crate) fn tool_payload(result: Value) -> Result<Value, McpError> {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        })
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str);

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(McpError::tool(text.unwrap_or("tool reported an error")));
    }

    if let Some(structured) = result.get("structuredContent") {
        return Ok(structured.clone());
    }

    match text {
        Some(text) => Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.into()))),
        None => Err(McpError::protocol("tool result carries no content")),
    }
}
