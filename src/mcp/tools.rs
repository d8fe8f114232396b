//! MCP tool definitions derived from the command catalog

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::catalog::{Catalog, CommandDescriptor};

/// MCP tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn from_command(command: &CommandDescriptor) -> Self {
        Self {
            name: command.identifier.clone(),
            description: command.description.clone(),
            input_schema: args_schema(&command.accepted_arguments),
        }
    }
}

/// Input schema with a single optional `args: string[]` field
pub fn args_schema(accepted_arguments: &[String]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "args": {
                "type": "array",
                "items": {"type": "string"},
                "description": format!("Arguments: {}", accepted_arguments.join(", "))
            }
        }
    })
}

/// Get all tool definitions, in catalog order
pub fn get_tool_definitions(catalog: &Catalog) -> Vec<ToolDefinition> {
    catalog
        .list_all()
        .iter()
        .map(ToolDefinition::from_command)
        .collect()
}
