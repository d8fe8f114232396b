//! CulturaBuilder CLI
//!
//! Browse the command catalog and inspect recorded usage metrics.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use culturabuilder::error::CbError;
use culturabuilder::mcp::CommandHandler;
use culturabuilder::metrics::{ExportFormat, TimePeriod, TimeSeries, UsageMetrics, UsageSummary};
use culturabuilder::{Catalog, InvocationRequest};

#[derive(Parser)]
#[command(name = "culturabuilder")]
#[command(about = "CulturaBuilder command catalog CLI")]
#[command(version)]
struct Cli {
    /// Usage metrics file (read by `metrics`, updated by `invoke`)
    #[arg(long, env = "CULTURABUILDER_METRICS_FILE", global = true)]
    metrics_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all commands
    List,
    /// Show one command with its arguments and examples
    Show {
        /// Command identifier, e.g. /cb:build
        command: String,
    },
    /// Describe what a command would do with the given arguments
    Invoke {
        /// Command identifier, e.g. /cb:build
        command: String,
        /// Arguments passed through to the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the usage metrics summary, a time series, or export a report
    Metrics {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Group operations by hour, day, week or month
        #[arg(long)]
        period: Option<TimePeriod>,
        /// Write a report (json, csv or markdown) instead of printing
        #[arg(long)]
        export: Option<ExportFormat>,
        /// Report path (default: metrics_export_<timestamp>.<ext>)
        #[arg(long, requires = "export")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let catalog = Catalog::builtin();

    // Expand ~ in path
    let metrics_path = cli
        .metrics_file
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()));

    match cli.command {
        Commands::List => {
            for command in catalog.list_all() {
                println!(
                    "{:<18} {}",
                    command.identifier,
                    truncate(&command.description, 70)
                );
            }
        }

        Commands::Show { command } => {
            let descriptor = catalog
                .get(&command)
                .ok_or_else(|| CbError::CommandNotFound(command.clone()))?;
            println!("{}", descriptor.identifier);
            println!("  {}", descriptor.description);
            println!("Arguments: {}", descriptor.accepted_arguments.join(", "));
            println!("Examples:");
            for example in &descriptor.examples {
                println!("  {}", example);
            }
        }

        Commands::Invoke { command, args } => {
            let mut handler = CommandHandler::new(catalog);
            if let Some(path) = metrics_path {
                // Saved as soon as the invocation is recorded
                let recorder = UsageMetrics::load(&path)
                    .with_context(|| format!("failed to read metrics from {}", path.display()))?
                    .persist_to(path);
                handler = handler.with_metrics(Arc::new(recorder));
            }

            let outcome = handler.call_tool(&InvocationRequest::new(command, args))?;
            println!("{}", outcome.joined_text());
        }

        Commands::Metrics {
            json,
            period,
            export,
            output,
        } => {
            let path = metrics_path.ok_or_else(|| {
                CbError::Config(
                    "no metrics file given (use --metrics-file or CULTURABUILDER_METRICS_FILE)"
                        .to_string(),
                )
            })?;
            let snapshot = UsageMetrics::load(&path)
                .with_context(|| format!("failed to read metrics from {}", path.display()))?
                .snapshot();

            if let Some(format) = export {
                let output = output.unwrap_or_else(|| default_export_path(format));
                let written = snapshot
                    .export(format, &output)
                    .with_context(|| format!("failed to export metrics to {}", output.display()))?;
                for file in written {
                    println!("{}", file.display());
                }
            } else if let Some(period) = period {
                let series = snapshot.time_series(period);
                if json {
                    println!("{}", serde_json::to_string_pretty(&series)?);
                } else {
                    print_time_series(&series);
                }
            } else {
                let summary = snapshot.summary();
                if json {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    print_summary(&summary);
                }
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &UsageSummary) {
    println!(
        "Commands: {} invocations, {} distinct",
        summary.total_commands, summary.unique_commands
    );
    println!(
        "Flags: {} uses, {} distinct",
        summary.total_flags_used, summary.unique_flags
    );
    println!(
        "Errors: {} ({} types)",
        summary.total_errors, summary.error_types
    );
    println!("Sessions: {}", summary.total_sessions);
    println!(
        "Success rate: {:.1}% over {} operations, avg {:.2} ms",
        summary.success_rate * 100.0,
        summary.total_operations,
        summary.avg_duration_ms
    );

    if !summary.top_commands.is_empty() {
        println!("Top commands:");
        for entry in &summary.top_commands {
            println!("  {:<18} {}", entry.name, entry.count);
        }
    }
    if !summary.top_flags.is_empty() {
        println!("Top flags:");
        for entry in &summary.top_flags {
            println!("  {:<18} {}", entry.name, entry.count);
        }
    }
    if !summary.by_command.is_empty() {
        println!("Per command:");
        for (name, averages) in &summary.by_command {
            println!(
                "  {:<18} {:>5} ops  {:>5.1}%  {:.2} ms",
                name,
                averages.total_count,
                averages.success_rate * 100.0,
                averages.avg_duration_ms
            );
        }
    }
}

fn print_time_series(series: &TimeSeries) {
    println!("Operations per {}:", series.period);
    for (i, start) in series.periods.iter().enumerate() {
        println!(
            "  {}  {:>5} ops  {:>5.1}%  {:>8.2} ms  top {}",
            start.format("%Y-%m-%d %H:%M"),
            series.operations[i],
            series.success_rate[i],
            series.avg_duration_ms[i],
            series.top_commands[i].name
        );
    }
}

fn default_export_path(format: ExportFormat) -> PathBuf {
    PathBuf::from(format!(
        "metrics_export_{}.{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or(s);
    if first_line.chars().count() <= max {
        first_line.to_string()
    } else {
        let kept: String = first_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
