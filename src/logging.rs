// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The level comes from `--log-level` when given, else from `[logging].level`
//! (which `STEPEXEC_LOGGING_LEVEL` can override), else `info`.
//!
//! Everything goes to STDERR: `stepexec execute` prints the command's result
//! on stdout.

use anyhow::{Result, anyhow};
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;
use crate::config::LoggingConfig;
use crate::types::LogFormat;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>, cfg: &LoggingConfig) -> Result<()> {
    let level = effective_level(cli_level, &cfg.level);

    let builder = fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = match cfg.format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Console => builder.with_ansi(true).compact().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

pub fn effective_level(cli_level: Option<LogLevel>, configured: &str) -> Level {
    cli_level
        .map(Level::from)
        .or_else(|| parse_level_str(configured))
        .unwrap_or(Level::INFO)
}

impl From<LogLevel> for Level {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Case-insensitive level name; `warning` is accepted for `warn`.
pub(crate) fn parse_level_str(s: &str) -> Option<Level> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("warning") {
        return Some(Level::WARN);
    }
    s.parse().ok()
}
