//! MCP JSON-RPC protocol implementation

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, Write};

use super::transport::StdioTransport;
use crate::error::{CbError, Result};

/// JSON-RPC version accepted and emitted by the server
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// MCP JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    /// `None` only when the member is absent; `"id": null` is `Some(Value::Null)`
    #[serde(
        default,
        deserialize_with = "deserialize_present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Keeps an explicit `null` id so the request is still answered
fn deserialize_present_id<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl McpRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// A request without an id member; never answered
    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: Value::Null,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// MCP JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// MCP error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i64, message: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(McpError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create error from CbError
    pub fn from_error(id: Option<Value>, err: CbError) -> Self {
        let mut response = Self::error(id, err.code(), err.to_string());
        if let (CbError::CommandNotFound(name), Some(error)) = (&err, response.error.as_mut()) {
            error.data = Some(json!({ "name": name }));
        }
        response
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Trait for handling MCP requests
///
/// Returning `None` means nothing is written back (notifications).
pub trait McpHandler: Send + Sync {
    fn handle_request(&self, request: McpRequest) -> Option<McpResponse>;
}

/// MCP server driving a handler over a line-delimited stream
pub struct McpServer<H>
where
    H: McpHandler,
{
    handler: H,
}

impl<H: McpHandler> McpServer<H> {
    /// Create a new MCP server
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Serve over a connected stdio transport until stdin closes
    pub fn run(&self, transport: StdioTransport) -> Result<()> {
        let (reader, writer) = transport.into_parts();
        self.serve(reader, writer)
    }

    /// Read one JSON-RPC message per line and write one response per line.
    ///
    /// Requests are handled strictly one at a time, so responses come back
    /// in the order the requests arrived. A frame that is not valid UTF-8 is
    /// answered with a parse error like any other malformed frame. Returns on
    /// EOF; only a failing stream ends the loop with an error.
    pub fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        let mut frame = Vec::new();

        loop {
            frame.clear();
            match reader.read_until(b'\n', &mut frame) {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let response = match std::str::from_utf8(&frame) {
                        Ok(line) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            self.dispatch_line(trimmed)
                        }
                        Err(e) => {
                            tracing::warn!("Frame is not valid UTF-8: {}", e);
                            Some(McpResponse::error(
                                None,
                                codes::PARSE_ERROR,
                                format!("Parse error: {}", e),
                            ))
                        }
                    };

                    if let Some(response) = response {
                        let response_json = serde_json::to_string(&response)?;
                        writeln!(writer, "{}", response_json)?;
                        writer.flush()?;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    return Err(CbError::Io(e));
                }
            }
        }

        tracing::info!("Input stream closed, stopping server");
        Ok(())
    }

    /// Decode a single frame and hand it to the handler
    fn dispatch_line(&self, line: &str) -> Option<McpResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Unparseable frame: {}", e);
                return Some(McpResponse::error(
                    None,
                    codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = value.get("id").cloned();

        let request: McpRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(McpResponse::error(
                    id,
                    codes::INVALID_REQUEST,
                    format!("Invalid Request: {}", e),
                ));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(McpResponse::error(
                id,
                codes::INVALID_REQUEST,
                format!("Invalid Request: unsupported jsonrpc version {}", request.jsonrpc),
            ));
        }

        self.handler.handle_request(request)
    }
}

/// Standard MCP methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const LIST_TOOLS: &str = "tools/list";
    pub const CALL_TOOL: &str = "tools/call";
}

/// MCP initialize result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// Server capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// Advertised as `{}`: tools are supported, no optional features
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged", default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: ServerInfo {
                name: "culturabuilder".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Echoes the method name back, stays silent on notifications
    struct EchoHandler;

    impl McpHandler for EchoHandler {
        fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
            if request.is_notification() {
                return None;
            }
            Some(McpResponse::success(request.id, json!(request.method)))
        }
    }

    fn serve_lines(input: &str) -> Vec<Value> {
        let server = McpServer::new(EchoHandler);
        let mut output = Vec::new();
        server.serve(Cursor::new(input), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_responses_in_request_order() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"a"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"b"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"c"}"#,
            "\n"
        );
        let responses = serve_lines(input);
        let ids: Vec<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(responses[2]["result"], json!("c"));
    }

    #[test]
    fn test_blank_lines_and_notifications_are_silent() {
        let input = concat!(
            "\n",
            "   \n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"x","method":"ping"}"#
        );
        let responses = serve_lines(input);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], json!("x"));
    }

    #[test]
    fn test_parse_error_has_null_id() {
        let responses = serve_lines("{not json}\n");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], json!(codes::PARSE_ERROR));
    }

    #[test]
    fn test_invalid_request_keeps_id() {
        let input = concat!(
            r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":8}"#,
            "\n"
        );
        let responses = serve_lines(input);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], json!(7));
        assert_eq!(responses[0]["error"]["code"], json!(codes::INVALID_REQUEST));
        assert_eq!(responses[1]["id"], json!(8));
        assert_eq!(responses[1]["error"]["code"], json!(codes::INVALID_REQUEST));
    }

    #[test]
    fn test_null_id_is_answered() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"ping"}"#,
            "\n"
        );
        let responses = serve_lines(input);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["result"], json!("ping"));
    }

    #[test]
    fn test_request_id_absent_vs_null() {
        let absent: McpRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "ping"})).unwrap();
        assert!(absent.is_notification());

        let null: McpRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": null, "method": "ping"}))
                .unwrap();
        assert!(!null.is_notification());
        assert_eq!(null.id, Some(Value::Null));
    }

    #[test]
    fn test_invalid_utf8_frame_gets_parse_error() {
        let mut input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"caf".to_vec();
        input.push(0xe9);
        input.extend_from_slice(b"\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n");

        let server = McpServer::new(EchoHandler);
        let mut output = Vec::new();
        server.serve(Cursor::new(input), &mut output).unwrap();
        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], json!(codes::PARSE_ERROR));
        assert_eq!(responses[1]["id"], json!(2));
    }

    #[test]
    fn test_from_error_command_not_found_data() {
        let response =
            McpResponse::from_error(Some(json!(4)), CbError::CommandNotFound("/cb:x".into()));
        let error = response.error.unwrap();
        assert_eq!(error.code, codes::INTERNAL_ERROR);
        assert_eq!(error.message, "Comando não encontrado: /cb:x");
        assert_eq!(error.data, Some(json!({"name": "/cb:x"})));
        assert!(response.result.is_none());
    }

    #[test]
    fn test_initialize_result_shape() {
        let value = serde_json::to_value(InitializeResult::default()).unwrap();
        assert_eq!(value["protocolVersion"], json!("2024-11-05"));
        assert_eq!(value["capabilities"], json!({"tools": {}}));
        assert_eq!(value["serverInfo"]["name"], json!("culturabuilder"));
    }
}
