//! Logging configuration and initialization
//!
//! Structured logging with tracing: compact console output for development
//! plus optional non-blocking file output.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Enable file logging (default: false)
    pub file_enabled: bool,
    /// Path for the log file (default: None, uses `playback.log`)
    pub file_path: Option<PathBuf>,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            default_level: "info".to_string(),
        }
    }
}

/// Initialize the logging system with the given configuration.
///
/// Returns a guard that must be kept alive for the duration of the program
/// so file logging is properly flushed.
///
/// # Environment Variables
///
/// - `CADENCE_LOG`: log level filter (e.g. "debug", "info,cadence_player=trace")
/// - `RUST_LOG`: consulted when `CADENCE_LOG` is unset
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_env("CADENCE_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let mut file_guard: Option<WorkerGuard> = None;
    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.file_enabled {
        let log_path = config
            .file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("playback.log"));
        let file = std::fs::File::create(&log_path)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        if config.console_enabled {
            let console_layer = fmt::layer().with_target(true).compact();
            subscriber.with(file_layer).with(console_layer).try_init()?;
        } else {
            subscriber.with(file_layer).try_init()?;
        }
    } else if config.console_enabled {
        let console_layer = fmt::layer().with_target(true).compact();
        subscriber.with(console_layer).try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        file_enabled = config.file_enabled,
        "logging initialized"
    );

    Ok(file_guard)
}

/// Initialize logging from the environment with sensible defaults.
pub fn init_logging_default(
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    init_logging(&LogConfig::default())
}

// Re-export so callers can store the guard without naming tracing-appender.
pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;
