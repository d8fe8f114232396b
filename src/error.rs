//! Error types for CulturaBuilder

use thiserror::Error;

/// Result type alias for CulturaBuilder operations
pub type Result<T> = std::result::Result<T, CbError>;

/// Main error type for CulturaBuilder
#[derive(Error, Debug)]
pub enum CbError {
    #[error("Transport bind error: {0}")]
    TransportBind(String),

    /// Unknown catalog identifier; hosts see the catalog's own wording
    #[error("Comando não encontrado: {0}")]
    CommandNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Duplicate command identifier: {0}")]
    DuplicateCommand(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CbError {
    /// Whether the error ends the server process rather than a single request
    pub fn is_fatal(&self) -> bool {
        matches!(self, CbError::TransportBind(_) | CbError::Io(_))
    }

    /// Get error code for MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            CbError::CommandNotFound(_) => -32603,
            CbError::InvalidParams(_) => -32602,
            CbError::MethodNotFound(_) => -32601,
            CbError::Serialization(_) => -32700,
            _ => -32000,
        }
    }

    /// Short machine-readable name, used as the error type in usage metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CbError::TransportBind(_) => "transport_bind",
            CbError::CommandNotFound(_) => "command_not_found",
            CbError::InvalidParams(_) => "invalid_params",
            CbError::MethodNotFound(_) => "method_not_found",
            CbError::DuplicateCommand(_) => "duplicate_command",
            CbError::Serialization(_) => "serialization",
            CbError::Io(_) => "io",
            CbError::Config(_) => "config",
        }
    }
}
