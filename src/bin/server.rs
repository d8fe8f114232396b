//! CulturaBuilder MCP Server
//!
//! Run with: culturabuilder-server

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use culturabuilder::error::{CbError, Result};
use culturabuilder::mcp::{CommandHandler, McpServer, StdioTransport};
use culturabuilder::{Catalog, UsageMetrics};

#[derive(Parser, Debug)]
#[command(name = "culturabuilder-server")]
#[command(about = "CulturaBuilder MCP server exposing the /cb: command catalog")]
#[command(version)]
struct Args {
    /// Usage metrics file; metrics are only recorded when this is set
    #[arg(long, env = "CULTURABUILDER_METRICS_FILE")]
    metrics_file: Option<String>,

    /// Log output format (text or json), always written to stderr
    #[arg(long, env = "CULTURABUILDER_LOG_FORMAT", default_value = "text")]
    log_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = CbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(CbError::Config(format!(
                "unknown log format '{}', expected text or json",
                other
            ))),
        }
    }
}

/// Initialize logging to stderr (stdout is for MCP protocol)
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init(),
    }
}

/// Load metrics if configured. A broken file is replaced, not fatal.
/// The file is rewritten after every recorded event.
fn open_metrics(metrics_file: Option<&str>) -> Option<(PathBuf, Arc<UsageMetrics>)> {
    let path = PathBuf::from(shellexpand::tilde(metrics_file?).to_string());

    let metrics = match UsageMetrics::load(&path) {
        Ok(metrics) => metrics,
        Err(e) => {
            tracing::warn!(
                "Could not read metrics from {} ({}), starting fresh",
                path.display(),
                e
            );
            UsageMetrics::new()
        }
    };

    tracing::info!("Recording usage metrics to {}", path.display());
    Some((path.clone(), Arc::new(metrics.persist_to(path))))
}

fn run(args: Args) -> Result<()> {
    let metrics = open_metrics(args.metrics_file.as_deref());

    let mut handler = CommandHandler::new(Catalog::builtin());
    if let Some((_, ref recorder)) = metrics {
        handler = handler.with_metrics(recorder.clone());
    }
    let command_count = handler.catalog().len();
    let server = McpServer::new(handler);

    let transport = StdioTransport::connect()?;
    tracing::info!(
        "🌟 CulturaBuilder MCP server started ({} commands)",
        command_count
    );

    let outcome = server.run(transport);

    if let Some((path, recorder)) = metrics {
        recorder.finish_session();
        if let Err(e) = recorder.save(&path) {
            tracing::error!("Failed to save metrics to {}: {}", path.display(), e);
        }
    }

    outcome
}

fn main() {
    let args = Args::parse();

    let format = match args.log_format.parse::<LogFormat>() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    init_logging(format);

    if let Err(e) = run(args) {
        tracing::error!("Server stopped: {}", e);
        std::process::exit(1);
    }

    tracing::info!("CulturaBuilder MCP server shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "yaml".parse::<LogFormat>(),
            Err(CbError::Config(_))
        ));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["culturabuilder-server"]).unwrap();
        assert_eq!(args.log_format, "text");

        let args = Args::try_parse_from([
            "culturabuilder-server",
            "--metrics-file",
            "~/.culturabuilder/metrics.json",
        ])
        .unwrap();
        assert_eq!(
            args.metrics_file.as_deref(),
            Some("~/.culturabuilder/metrics.json")
        );
    }

    #[test]
    fn test_open_metrics_disabled_without_path() {
        assert!(open_metrics(None).is_none());
    }

    #[test]
    fn test_open_metrics_recovers_from_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, "garbage").unwrap();

        let (opened_path, metrics) = open_metrics(path.to_str()).unwrap();
        assert_eq!(opened_path, path);
        assert_eq!(metrics.summary().total_commands, 0);
    }

    #[test]
    fn test_open_metrics_persists_each_invocation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let (_, metrics) = open_metrics(path.to_str()).unwrap();
        assert_eq!(metrics.persist_path(), Some(path.as_path()));

        let handler = CommandHandler::new(Catalog::builtin()).with_metrics(metrics);
        handler
            .call_tool(&culturabuilder::InvocationRequest::new(
                "/cb:build",
                vec!["--optimize".to_string()],
            ))
            .unwrap();

        let on_disk = UsageMetrics::load(&path).unwrap().summary();
        assert_eq!(on_disk.total_commands, 1);
        assert_eq!(on_disk.top_flags[0].name, "--optimize");
    }
}
