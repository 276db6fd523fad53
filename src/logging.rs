//! Logging setup for the scrubline binary.
//!
//! Console output always; with file logging enabled, daily rotating files
//! under the platform data directory as well:
//!
//! - `scrubline.<date>.log`: everything that passes the filter
//! - `error.<date>.log`: warnings and errors only
//!
//! The filter defaults to `info` and is overridden by `RUST_LOG`.
//!
//! ```no_run
//! scrubline::logging::init(false)?;
//! tracing::info!("ready");
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const MAX_LOG_FILES: usize = 10;

/// Log directory, created on first use.
///
/// - Windows: `%APPDATA%/scrubline/logs`
/// - macOS: `~/Library/Application Support/scrubline/logs`
/// - Linux: `~/.local/share/scrubline/logs`
///
/// # Errors
///
/// Fails when the data directory is unknown or cannot be created.
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    let log_dir = base_dir.join("scrubline").join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    Ok(log_dir)
}

fn env_filter() -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")
}

fn appender(dir: &std::path::Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to create {prefix} log appender"))
}

/// Installs the global subscriber. Console output goes to stderr so command
/// output on stdout stays machine-readable.
///
/// # Errors
///
/// Fails when the filter is invalid, the log files cannot be opened, or a
/// subscriber is already installed.
pub fn init(log_to_file: bool) -> Result<()> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if !log_to_file {
        tracing_subscriber::registry()
            .with(env_filter()?)
            .with(console_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(());
    }

    let log_dir = get_log_dir()?;
    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(appender(&log_dir, "scrubline")?);
    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(appender(&log_dir, "error")?)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(console_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(log_dir = %log_dir.display(), "Logging initialized");
    Ok(())
}
