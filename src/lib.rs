//! CulturaBuilder - command catalog MCP server
//!
//! Advertises the `/cb:` developer-workflow commands to an MCP host over
//! stdio and answers invocations with a description of what each command
//! does. Usage is recorded for the metrics dashboard.

pub mod catalog;
pub mod error;
pub mod mcp;
pub mod metrics;
pub mod types;

pub use catalog::{Catalog, CommandDescriptor};
pub use error::{CbError, Result};
pub use metrics::{ExportFormat, TimePeriod, UsageMetrics, UsageSummary};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
