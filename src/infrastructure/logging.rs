//! Logging system configuration and initialization
//!
//! - Console and/or file output, file output optionally as JSON
//! - Previous log file is renamed with its timestamp on startup
//! - Timestamps in Brasília time (UTC-3)
//! - Noisy dependencies (sqlx, reqwest, hyper, chromiumoxide) are held back
//!   unless TRACE is requested
//!
//! `RUST_LOG` overrides the computed filter entirely:
//! ```bash
//! RUST_LOG="debug,sqlx::query=debug" hunter-crawler run
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::app_data_dir;

const LOG_FILE_NAME: &str = "hunter.log";

/// Brasília is UTC-3 all year round
const BRT_OFFSET_SECS: i32 = 3 * 3600;

fn brt() -> FixedOffset {
    FixedOffset::west_opt(BRT_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Timestamps in Brasília time
struct BrtTimeFormatter;

impl FormatTime for BrtTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Utc::now().with_timezone(&brt());
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Log directory from the config, or `<data dir>/logs`
pub fn log_directory(config: &LoggingConfig) -> PathBuf {
    config
        .log_dir
        .clone()
        .unwrap_or_else(|| app_data_dir().join("logs"))
}

/// Filter directives for `level`; dependencies are quieted below TRACE
pub fn filter_directives(level: &str) -> String {
    let level = level.trim().to_lowercase();
    if level.contains("trace") {
        return level;
    }
    [
        level.as_str(),
        "sqlx::query=warn",
        "sqlx::sqlite=warn",
        "reqwest=info",
        "hyper=warn",
        "hyper_util=warn",
        "h2=warn",
        "tokio=info",
        "runtime=warn",
        "chromiumoxide=warn",
        "tungstenite=warn",
        "html5ever=warn",
        "selectors=warn",
    ]
    .join(",")
}

/// Rename an existing log file to `<stem>.<timestamp>.log`
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<()> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(&log_file_path).context("Failed to get log file metadata")?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let stamped: DateTime<Utc> = file_time.into();

    let file_stem = log_file_name.trim_end_matches(".log");
    let rotated = log_dir.join(format!(
        "{}.{}.log",
        file_stem,
        stamped.with_timezone(&brt()).format("%Y%m%dT%H%M%S")
    ));
    std::fs::rename(&log_file_path, &rotated).with_context(|| {
        format!(
            "Failed to rotate log file {} to {}",
            log_file_path.display(),
            rotated.display()
        )
    })?;
    Ok(())
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive in
/// `main` for the whole run.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(&config.level))
            .with_context(|| format!("Invalid log level '{}'", config.level))?,
    };

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(BrtTimeFormatter)
            .with_target(false)
    });

    let mut guard = None;
    let file_layer = if config.file_output {
        let log_dir = log_directory(config);
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        rotate_existing_log_file(&log_dir, LOG_FILE_NAME)?;

        let (writer, file_guard) = non_blocking(rolling::never(&log_dir, LOG_FILE_NAME));
        guard = Some(file_guard);

        let layer = fmt::Layer::new()
            .with_writer(writer)
            .with_timer(BrtTimeFormatter)
            .with_ansi(false);
        Some(if config.json_format {
            layer
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            layer.with_target(false).boxed()
        })
    } else {
        None
    };

    if console_layer.is_none() && file_layer.is_none() {
        return Err(anyhow!("No logging output configured"));
    }

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!(
        level = %config.level,
        json = config.json_format,
        console = config.console_output,
        file = config.file_output,
        "Logging system initialized"
    );
    if config.file_output {
        info!("Log directory: {}", log_directory(config).display());
    }

    Ok(guard)
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Hunter Crawler ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {}", current_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiets_dependencies_below_trace() {
        let directives = filter_directives("DEBUG");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("sqlx::query=warn"));
        assert!(directives.contains("chromiumoxide=warn"));
        assert_eq!(filter_directives("trace"), "trace");
        assert!(EnvFilter::try_new(filter_directives("info")).is_ok());
    }

    #[test]
    fn rotates_previous_log_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOG_FILE_NAME), "old run\n").unwrap();

        rotate_existing_log_file(dir.path(), LOG_FILE_NAME).unwrap();

        assert!(!dir.path().join(LOG_FILE_NAME).exists());
        let rotated: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(rotated.len(), 1);
        assert!(rotated[0].starts_with("hunter.") && rotated[0].ends_with(".log"));
    }

    #[test]
    fn log_directory_prefers_configured_path() {
        let config = LoggingConfig {
            log_dir: Some(PathBuf::from("/tmp/hunter-logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(log_directory(&config), PathBuf::from("/tmp/hunter-logs"));
        assert!(log_directory(&LoggingConfig::default()).ends_with("logs"));
    }
}
