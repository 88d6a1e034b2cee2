// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, StepexecError};
use crate::types::LogFormat;

/// Prefix of every environment override, e.g. `STEPEXEC_SERVER_PORT`.
pub const ENV_PREFIX: &str = "STEPEXEC";

/// Read and deserialize a TOML config file. No validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load the effective configuration.
///
/// - An explicit `path` must exist.
/// - Without one, [`default_config_path`] is used when present, otherwise
///   built-in defaults.
/// - `STEPEXEC_*` environment variables override file values.
/// - The result is validated.
pub fn load(path: Option<&Path>) -> Result<ConfigFile> {
    let raw = match path {
        Some(path) => load_from_path(path)?,
        None => {
            let fallback = default_config_path();
            if fallback.is_file() {
                load_from_path(&fallback)?
            } else {
                debug!(path = %fallback.display(), "no config file found; using defaults");
                RawConfigFile::default()
            }
        }
    };

    let raw = apply_env_overrides(raw, |key| std::env::var(key).ok())?;
    ConfigFile::try_from(raw)
}

/// Overlay environment values onto `raw`.
///
/// `lookup` maps a variable name to its value; production passes
/// `std::env::var`, tests pass a map.
pub fn apply_env_overrides<F>(mut raw: RawConfigFile, lookup: F) -> Result<RawConfigFile>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));

    if let Some(v) = var("SERVER_HOST") {
        raw.server.host = v;
    }
    if let Some(v) = var("SERVER_PORT") {
        raw.server.port = parse_env("SERVER_PORT", &v)?;
    }
    if let Some(v) = var("SERVER_SHUTDOWN_GRACE_SECS") {
        raw.server.shutdown_grace_secs = parse_env("SERVER_SHUTDOWN_GRACE_SECS", &v)?;
    }
    if let Some(v) = var("EXECUTOR_ALLOWED_TOOLS") {
        raw.executor.allowed_tools = v
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = var("EXECUTOR_DEFAULT_TIMEOUT") {
        raw.executor.default_timeout = parse_env("EXECUTOR_DEFAULT_TIMEOUT", &v)?;
    }
    if let Some(v) = var("EXECUTOR_MAX_CONCURRENT") {
        raw.executor.max_concurrent = parse_env("EXECUTOR_MAX_CONCURRENT", &v)?;
    }
    if let Some(v) = var("EXECUTOR_WORKSPACE_BASE") {
        raw.executor.workspace_base = v;
    }
    if let Some(v) = var("LOGGING_LEVEL") {
        raw.logging.level = v;
    }
    if let Some(v) = var("LOGGING_FORMAT") {
        raw.logging.format = LogFormat::from_str(&v).map_err(StepexecError::ConfigError)?;
    }

    Ok(raw)
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err| {
        StepexecError::ConfigError(format!("{ENV_PREFIX}_{name}='{value}': {err}"))
    })
}

/// `stepexec.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("stepexec.toml")
}
