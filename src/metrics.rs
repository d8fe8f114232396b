//! Command usage metrics
//!
//! Records how the catalog is used (invocations, flags, errors, sessions)
//! and persists it as a JSON snapshot that the dashboard reads. Histories
//! are bounded so the snapshot cannot grow without limit.
//!
//! A recorder with a backing file rewrites it after every recorded event, so
//! a killed server loses nothing it already answered.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CbError, Result};
use crate::types::extract_flags;

/// Snapshot format version
pub const SNAPSHOT_VERSION: &str = "1.0.0";
/// Operation history cap
pub const MAX_OPERATIONS: usize = 1000;
/// Recent error cap
pub const MAX_RECENT_ERRORS: usize = 100;
/// Session history cap
pub const MAX_SESSIONS: usize = 100;
/// Entries in the top-commands / top-flags rankings
pub const TOP_N: usize = 5;
/// Rows in the command and flag tables of a Markdown report
pub const REPORT_ROWS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandStats {
    pub count: u64,
    pub success: u64,
    pub failed: u64,
    pub total_duration_ms: f64,
    #[serde(default)]
    pub flags_used: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagStats {
    pub count: u64,
    #[serde(default)]
    pub commands: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub flags: Vec<String>,
    pub success: bool,
    pub duration_ms: f64,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub error_type: String,
    pub command: Option<String>,
    pub details: Option<String>,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSection {
    #[serde(default)]
    pub commands: BTreeMap<String, CommandStats>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagStats>,
    #[serde(default)]
    pub sessions: VecDeque<SessionRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSection {
    #[serde(default)]
    pub operations: VecDeque<OperationRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSection {
    #[serde(default)]
    pub by_type: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_command: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default)]
    pub recent: VecDeque<ErrorRecord>,
}

/// Persisted metrics document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub version: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub usage: UsageSection,
    #[serde(default)]
    pub performance: PerformanceSection,
    #[serde(default)]
    pub errors: ErrorSection,
}

impl Default for UsageSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            created_at: Utc::now(),
            usage: UsageSection::default(),
            performance: PerformanceSection::default(),
            errors: ErrorSection::default(),
        }
    }
}

/// A name with its usage count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

/// Per-command figures over the operation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAverages {
    pub avg_duration_ms: f64,
    /// Fraction of this command's operations that succeeded (0.0 - 1.0)
    pub success_rate: f64,
    pub total_count: u64,
}

/// Aggregate view over a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_commands: u64,
    pub unique_commands: usize,
    pub total_flags_used: u64,
    pub unique_flags: usize,
    pub total_sessions: usize,
    pub total_errors: u64,
    pub error_types: usize,
    pub total_operations: usize,
    /// Fraction of recorded operations that succeeded (0.0 - 1.0)
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub top_commands: Vec<NamedCount>,
    pub top_flags: Vec<NamedCount>,
    #[serde(default)]
    pub by_command: BTreeMap<String, CommandAverages>,
}

/// Bucket width for [`UsageSnapshot::time_series`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Hour,
    Day,
    Week,
    Month,
}

impl TimePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Hour => "hour",
            TimePeriod::Day => "day",
            TimePeriod::Week => "week",
            TimePeriod::Month => "month",
        }
    }

    /// Start of the bucket holding `timestamp`; weeks start on Monday
    pub fn bucket_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let date = timestamp.date_naive();
        let (day, hour) = match self {
            TimePeriod::Hour => (date, timestamp.hour()),
            TimePeriod::Day => (date, 0),
            TimePeriod::Week => {
                let back = i64::from(date.weekday().num_days_from_monday());
                (date - chrono::Duration::days(back), 0)
            }
            TimePeriod::Month => (date.with_day(1).unwrap_or(date), 0),
        };

        day.and_hms_opt(hour, 0, 0)
            .map(|start| Utc.from_utc_datetime(&start))
            .unwrap_or(timestamp)
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = CbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(TimePeriod::Hour),
            "day" => Ok(TimePeriod::Day),
            "week" => Ok(TimePeriod::Week),
            "month" => Ok(TimePeriod::Month),
            other => Err(CbError::Config(format!(
                "unknown period '{}' (expected hour, day, week or month)",
                other
            ))),
        }
    }
}

/// Operation history grouped into time buckets, oldest first.
/// All vectors are parallel to `periods`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub period: TimePeriod,
    pub periods: Vec<DateTime<Utc>>,
    pub operations: Vec<u64>,
    /// Percentage of successful operations per bucket (0 - 100)
    pub success_rate: Vec<f64>,
    pub avg_duration_ms: Vec<f64>,
    /// Most used command per bucket
    pub top_commands: Vec<NamedCount>,
}

#[derive(Default)]
struct Bucket {
    count: u64,
    success: u64,
    duration_ms: f64,
    commands: BTreeMap<String, u64>,
}

/// Output format for [`UsageSnapshot::export`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    /// One file each for commands, flags and operations
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            other => Err(CbError::Config(format!(
                "unknown export format '{}' (expected json, csv or markdown)",
                other
            ))),
        }
    }
}

impl UsageSnapshot {
    pub fn summary(&self) -> UsageSummary {
        let operations = &self.performance.operations;
        let (success_rate, avg_duration_ms) = if operations.is_empty() {
            (0.0, 0.0)
        } else {
            let total = operations.len() as f64;
            let successes = operations.iter().filter(|op| op.success).count() as f64;
            let duration: f64 = operations.iter().map(|op| op.duration_ms).sum();
            (successes / total, duration / total)
        };

        UsageSummary {
            total_commands: self.usage.commands.values().map(|c| c.count).sum(),
            unique_commands: self.usage.commands.len(),
            total_flags_used: self.usage.flags.values().map(|f| f.count).sum(),
            unique_flags: self.usage.flags.len(),
            total_sessions: self.usage.sessions.len(),
            total_errors: self.errors.by_type.values().sum(),
            error_types: self.errors.by_type.len(),
            total_operations: operations.len(),
            success_rate,
            avg_duration_ms,
            top_commands: top_n(self.usage.commands.iter().map(|(k, v)| (k, v.count))),
            top_flags: top_n(self.usage.flags.iter().map(|(k, v)| (k, v.count))),
            by_command: self.command_averages(),
        }
    }

    /// Average duration and success rate per command over the history
    pub fn command_averages(&self) -> BTreeMap<String, CommandAverages> {
        let mut totals: BTreeMap<&str, (u64, u64, f64)> = BTreeMap::new();
        for op in &self.performance.operations {
            let entry = totals.entry(op.command.as_str()).or_default();
            entry.0 += 1;
            entry.1 += u64::from(op.success);
            entry.2 += op.duration_ms;
        }

        totals
            .into_iter()
            .map(|(command, (count, success, duration_ms))| {
                let averages = CommandAverages {
                    avg_duration_ms: duration_ms / count as f64,
                    success_rate: success as f64 / count as f64,
                    total_count: count,
                };
                (command.to_string(), averages)
            })
            .collect()
    }

    /// Group the operation history by `period`
    pub fn time_series(&self, period: TimePeriod) -> TimeSeries {
        let mut buckets: BTreeMap<DateTime<Utc>, Bucket> = BTreeMap::new();
        for op in &self.performance.operations {
            let bucket = buckets.entry(period.bucket_start(op.timestamp)).or_default();
            bucket.count += 1;
            bucket.success += u64::from(op.success);
            bucket.duration_ms += op.duration_ms;
            *bucket.commands.entry(op.command.clone()).or_insert(0) += 1;
        }

        let mut series = TimeSeries {
            period,
            periods: Vec::with_capacity(buckets.len()),
            operations: Vec::with_capacity(buckets.len()),
            success_rate: Vec::with_capacity(buckets.len()),
            avg_duration_ms: Vec::with_capacity(buckets.len()),
            top_commands: Vec::with_capacity(buckets.len()),
        };

        for (start, bucket) in buckets {
            let count = bucket.count as f64;
            series.periods.push(start);
            series.operations.push(bucket.count);
            series.success_rate.push(bucket.success as f64 / count * 100.0);
            series.avg_duration_ms.push(bucket.duration_ms / count);
            series.top_commands.push(
                top_n(bucket.commands.iter().map(|(k, v)| (k, *v)))
                    .into_iter()
                    .next()
                    .unwrap_or(NamedCount {
                        name: String::new(),
                        count: 0,
                    }),
            );
        }

        series
    }

    /// Write the snapshot to `output` in `format`, returning every file written.
    /// CSV exports write `<stem>_commands.csv`, `<stem>_flags.csv` and
    /// `<stem>_operations.csv` next to `output`.
    pub fn export(&self, format: ExportFormat, output: &Path) -> Result<Vec<PathBuf>> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let written = match format {
            ExportFormat::Json => {
                fs::write(output, serde_json::to_string_pretty(self)?)?;
                vec![output.to_path_buf()]
            }
            ExportFormat::Markdown => {
                fs::write(output, self.to_markdown())?;
                vec![output.to_path_buf()]
            }
            ExportFormat::Csv => {
                let stem = output.with_extension("");
                let tables = [
                    ("commands", self.commands_csv()),
                    ("flags", self.flags_csv()),
                    ("operations", self.operations_csv()),
                ];
                let mut written = Vec::with_capacity(tables.len());
                for (section, body) in tables {
                    let path = PathBuf::from(format!("{}_{}.csv", stem.display(), section));
                    fs::write(&path, body)?;
                    written.push(path);
                }
                written
            }
        };

        tracing::info!(format = format.extension(), files = written.len(), "Exported usage metrics");
        Ok(written)
    }

    /// `Command,Count,Success,Failed,Avg Duration (ms)`
    pub fn commands_csv(&self) -> String {
        let mut out = String::from("Command,Count,Success,Failed,Avg Duration (ms)\n");
        for (command, stats) in &self.usage.commands {
            let avg = if stats.count > 0 {
                stats.total_duration_ms / stats.count as f64
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "{},{},{},{},{:.2}",
                csv_field(command),
                stats.count,
                stats.success,
                stats.failed,
                avg
            );
        }
        out
    }

    /// `Flag,Count,Top Commands` with up to three commands per flag
    pub fn flags_csv(&self) -> String {
        let mut out = String::from("Flag,Count,Top Commands\n");
        for (flag, stats) in &self.usage.flags {
            let _ = writeln!(
                out,
                "{},{},{}",
                csv_field(flag),
                stats.count,
                csv_field(&top_commands_for(stats))
            );
        }
        out
    }

    /// `Timestamp,Command,Flags,Success,Duration (ms)`
    pub fn operations_csv(&self) -> String {
        let mut out = String::from("Timestamp,Command,Flags,Success,Duration (ms)\n");
        for op in &self.performance.operations {
            let _ = writeln!(
                out,
                "{},{},{},{},{:.2}",
                op.timestamp.to_rfc3339(),
                csv_field(&op.command),
                csv_field(&op.flags.join(" ")),
                op.success,
                op.duration_ms
            );
        }
        out
    }

    /// Human-readable report: summary, top commands, top flags, errors
    pub fn to_markdown(&self) -> String {
        let summary = self.summary();
        let mut md = String::from("# CulturaBuilder Metrics Report\n\n");
        let _ = writeln!(md, "Generated: {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"));

        md.push_str("## Summary Statistics\n\n| Metric | Value |\n|--------|-------|\n");
        let _ = writeln!(md, "| Total Commands | {} |", summary.total_commands);
        let _ = writeln!(md, "| Unique Commands | {} |", summary.unique_commands);
        let _ = writeln!(md, "| Total Sessions | {} |", summary.total_sessions);
        let _ = writeln!(md, "| Success Rate | {:.1}% |", summary.success_rate * 100.0);
        let _ = writeln!(md, "| Avg Duration | {:.2} ms |", summary.avg_duration_ms);
        let _ = writeln!(md, "| Total Errors | {} |", summary.total_errors);

        md.push_str("\n## Top Commands\n\n");
        md.push_str("| Command | Count | Success Rate | Avg Duration |\n");
        md.push_str("|---------|-------|--------------|--------------|\n");
        let mut commands: Vec<(&String, &CommandStats)> = self.usage.commands.iter().collect();
        commands.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
        for (command, stats) in commands.into_iter().take(REPORT_ROWS) {
            let (rate, avg) = if stats.count > 0 {
                let count = stats.count as f64;
                (stats.success as f64 / count * 100.0, stats.total_duration_ms / count)
            } else {
                (0.0, 0.0)
            };
            let _ = writeln!(
                md,
                "| {} | {} | {:.1}% | {:.2} ms |",
                command, stats.count, rate, avg
            );
        }

        md.push_str("\n## Top Flags\n\n| Flag | Count | Top Commands |\n|------|-------|--------------|\n");
        let mut flags: Vec<(&String, &FlagStats)> = self.usage.flags.iter().collect();
        flags.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
        for (flag, stats) in flags.into_iter().take(REPORT_ROWS) {
            let _ = writeln!(md, "| {} | {} | {} |", flag, stats.count, top_commands_for(stats));
        }

        md.push_str("\n## Errors by Type\n\n| Error Type | Count |\n|------------|-------|\n");
        let mut errors: Vec<(&String, &u64)> = self.errors.by_type.iter().collect();
        errors.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (error_type, count) in errors {
            let _ = writeln!(md, "| {} | {} |", error_type, count);
        }

        md
    }
}

/// Up to three commands a flag was used with, most frequent first
fn top_commands_for(stats: &FlagStats) -> String {
    let mut commands: Vec<(&String, &u64)> = stats.commands.iter().collect();
    commands.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    commands
        .into_iter()
        .take(3)
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote a CSV field when it holds a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_snapshot(path: &Path, snapshot: &UsageSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Highest counts first, ties by name
fn top_n<'a>(entries: impl Iterator<Item = (&'a String, u64)>) -> Vec<NamedCount> {
    let mut ranked: Vec<NamedCount> = entries
        .map(|(name, count)| NamedCount {
            name: name.clone(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(TOP_N);
    ranked
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    queue.push_back(item);
    while queue.len() > cap {
        queue.pop_front();
    }
}

/// Thread-safe usage recorder for one server session
pub struct UsageMetrics {
    state: Mutex<UsageSnapshot>,
    session_id: String,
    session_start: DateTime<Utc>,
    /// Rewritten after every recorded event when set
    persist_path: Option<PathBuf>,
}

impl Default for UsageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageMetrics {
    /// Start a fresh recorder
    pub fn new() -> Self {
        Self::from_snapshot(UsageSnapshot::default())
    }

    /// Continue recording on top of an existing snapshot
    pub fn from_snapshot(snapshot: UsageSnapshot) -> Self {
        let session_start = Utc::now();
        Self {
            state: Mutex::new(snapshot),
            session_id: format!("session_{}", session_start.timestamp_millis()),
            session_start,
            persist_path: None,
        }
    }

    /// Save to `path` after every recorded invocation and error
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_path.as_deref()
    }

    /// Resume from a snapshot file; a missing file starts fresh
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No metrics file at {}, starting fresh", path.display());
            return Ok(Self::new());
        }

        let raw = fs::read_to_string(path)?;
        let snapshot: UsageSnapshot = serde_json::from_str(&raw)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Runs with the state lock held so concurrent writers cannot interleave.
    /// Failures are logged; recording never fails a request.
    fn persist(&self, state: &UsageSnapshot) {
        if let Some(ref path) = self.persist_path {
            if let Err(e) = write_snapshot(path, state) {
                tracing::warn!("Failed to persist usage metrics to {}: {}", path.display(), e);
            }
        }
    }

    /// Record one command invocation
    pub fn record_invocation(
        &self,
        command: &str,
        args: &[String],
        success: bool,
        duration: Duration,
    ) {
        let flags = extract_flags(args);
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let mut state = self.state.lock();

        let stats = state.usage.commands.entry(command.to_string()).or_default();
        stats.count += 1;
        if success {
            stats.success += 1;
        } else {
            stats.failed += 1;
        }
        stats.total_duration_ms += duration_ms;
        for flag in &flags {
            *stats.flags_used.entry(flag.to_string()).or_insert(0) += 1;
        }

        for flag in &flags {
            let flag_stats = state.usage.flags.entry(flag.to_string()).or_default();
            flag_stats.count += 1;
            *flag_stats.commands.entry(command.to_string()).or_insert(0) += 1;
        }

        let record = OperationRecord {
            timestamp: Utc::now(),
            command: command.to_string(),
            flags: flags.iter().map(|f| f.to_string()).collect(),
            success,
            duration_ms,
            session_id: self.session_id.clone(),
        };
        push_bounded(&mut state.performance.operations, record, MAX_OPERATIONS);
        self.persist(&state);
    }

    /// Record a failed request
    pub fn record_error(&self, error_type: &str, command: Option<&str>, details: Option<&str>) {
        let mut state = self.state.lock();

        *state
            .errors
            .by_type
            .entry(error_type.to_string())
            .or_insert(0) += 1;

        if let Some(command) = command {
            *state
                .errors
                .by_command
                .entry(command.to_string())
                .or_default()
                .entry(error_type.to_string())
                .or_insert(0) += 1;
        }

        let record = ErrorRecord {
            timestamp: Utc::now(),
            error_type: error_type.to_string(),
            command: command.map(str::to_string),
            details: details.map(str::to_string),
            session_id: self.session_id.clone(),
        };
        push_bounded(&mut state.errors.recent, record, MAX_RECENT_ERRORS);
        self.persist(&state);
    }

    /// Close the current session and append it to the history
    pub fn finish_session(&self) {
        let end = Utc::now();
        let duration_secs = (end - self.session_start)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let record = SessionRecord {
            id: self.session_id.clone(),
            start: self.session_start,
            end,
            duration_secs,
        };

        let mut state = self.state.lock();
        push_bounded(&mut state.usage.sessions, record, MAX_SESSIONS);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.state.lock().clone()
    }

    pub fn summary(&self) -> UsageSummary {
        self.state.lock().summary()
    }

    /// Write the snapshot as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        write_snapshot(path, &self.state.lock())?;

        tracing::debug!("Saved usage metrics to {}", path.display());
        Ok(())
    }
}
