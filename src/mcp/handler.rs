//! Request handler serving the command catalog

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use super::protocol::{methods, InitializeResult, McpHandler, McpRequest, McpResponse};
use super::tools::{get_tool_definitions, ToolDefinition};
use crate::catalog::Catalog;
use crate::error::{CbError, Result};
use crate::metrics::UsageMetrics;
use crate::types::{InvocationRequest, InvocationResponse};

/// MCP request handler backed by an immutable catalog
pub struct CommandHandler {
    catalog: Catalog,
    /// Usage recorder, only present when metrics are enabled
    metrics: Option<Arc<UsageMetrics>>,
}

impl CommandHandler {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<UsageMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Discovery: one tool per catalog entry
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        get_tool_definitions(&self.catalog)
    }

    /// Invocation: describe the named command. Arguments are accepted as-is.
    pub fn call_tool(&self, request: &InvocationRequest) -> Result<InvocationResponse> {
        let started = Instant::now();

        let Some(command) = self.catalog.get(&request.identifier) else {
            tracing::warn!("Unknown command requested: {}", request.identifier);
            let err = CbError::CommandNotFound(request.identifier.clone());
            self.record_error(&err, Some(request.identifier.as_str()));
            return Err(err);
        };

        let response = InvocationResponse::describe(command);

        tracing::info!(
            command = %command.identifier,
            args = request.args.len(),
            "Command invoked"
        );
        if let Some(ref metrics) = self.metrics {
            metrics.record_invocation(&command.identifier, &request.args, true, started.elapsed());
        }

        Ok(response)
    }

    /// Parse raw `tools/call` params, then invoke
    fn invoke(&self, params: Value) -> Result<InvocationResponse> {
        let request = InvocationRequest::from_params(params).map_err(|err| {
            self.record_error(&err, None);
            err
        })?;
        self.call_tool(&request)
    }

    fn record_error(&self, err: &CbError, command: Option<&str>) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_error(err.kind(), command, Some(err.to_string().as_str()));
        }
    }
}

impl McpHandler for CommandHandler {
    fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        let notification = request.is_notification();
        let id = request.id;

        let result: Result<Value> = match request.method.as_str() {
            methods::INITIALIZE => Ok(json!(InitializeResult::default())),
            methods::INITIALIZED => {
                tracing::info!("Host finished initialization");
                Ok(json!({}))
            }
            methods::PING => Ok(json!({})),
            methods::LIST_TOOLS => Ok(json!({ "tools": self.list_tools() })),
            methods::CALL_TOOL => self.invoke(request.params).map(|response| json!(response)),
            other => Err(CbError::MethodNotFound(other.to_string())),
        };

        if notification {
            if let Err(e) = result {
                tracing::debug!("Ignoring failed notification: {}", e);
            }
            return None;
        }

        Some(match result {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::from_error(id, e),
        })
    }
}
