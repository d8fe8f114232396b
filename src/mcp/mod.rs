//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC over stdio exposing the command catalog as tools.

pub mod handler;
pub mod protocol;
pub mod tools;
pub mod transport;

pub use handler::CommandHandler;
pub use protocol::{
    codes, methods, InitializeResult, McpError, McpHandler, McpRequest, McpResponse, McpServer,
};
pub use tools::{get_tool_definitions, ToolDefinition};
pub use transport::StdioTransport;
