//! Core request/response values for command invocation

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::CommandDescriptor;
use crate::error::{CbError, Result};

/// A validated `tools/call` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub identifier: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Wire shape of `tools/call` params: `{name, arguments: {args}}`
#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<CallToolArguments>,
}

#[derive(Debug, Default, Deserialize)]
struct CallToolArguments {
    #[serde(default)]
    args: Option<Vec<String>>,
}

impl InvocationRequest {
    pub fn new(identifier: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            identifier: identifier.into(),
            args,
        }
    }

    /// Parse raw JSON-RPC params, rejecting anything that is not
    /// `{name: string, arguments?: {args?: string[]}}`
    pub fn from_params(params: Value) -> Result<Self> {
        let params: CallToolParams =
            serde_json::from_value(params).map_err(|e| CbError::InvalidParams(e.to_string()))?;

        let args = params
            .arguments
            .and_then(|arguments| arguments.args)
            .unwrap_or_default();

        Ok(Self {
            identifier: params.name,
            args,
        })
    }

    /// Flag-style arguments, normalized to their name (`--env=prod` -> `--env`)
    pub fn flags(&self) -> Vec<&str> {
        extract_flags(&self.args)
    }
}

/// Flag-style names among free-form arguments
pub fn extract_flags(args: &[String]) -> Vec<&str> {
    args.iter()
        .filter(|arg| arg.starts_with("--") && arg.len() > 2)
        .map(|arg| arg.split('=').next().unwrap_or(arg))
        .collect()
}

/// One block of tool output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Result payload of a successful `tools/call`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub content: Vec<ContentBlock>,
}

impl InvocationResponse {
    /// Create a text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Describe what the command would do. Nothing is executed.
    pub fn describe(command: &CommandDescriptor) -> Self {
        Self::text(format!(
            "🌟 Executando {}\n\n{}\n\nExemplos:\n{}",
            command.identifier,
            command.description,
            command.examples.join("\n")
        ))
    }

    /// Concatenated text of all blocks
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
