// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::LogFormat;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// host = "0.0.0.0"
/// port = 8081
///
/// [executor]
/// allowed_tools = ["git", "npm", "make"]
/// default_timeout = 3600
///
/// [logging]
/// level = "info"
/// format = "json"
/// ```
///
/// All sections are optional and have defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        server: ServerConfig,
        executor: ExecutorConfig,
        logging: LoggingConfig,
    ) -> Self {
        Self {
            server,
            executor,
            logging,
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long in-flight calls may drain after a shutdown signal before
    /// running processes are cancelled.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Tools callers may run, matched case-insensitively.
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,

    /// Seconds; used when a request carries no timeout.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout: u64,

    /// Reported by the health endpoint. Not enforced.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Base directory for relative pipeline workspaces.
    #[serde(default = "default_workspace_base")]
    pub workspace_base: String,
}

impl ExecutorConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            allowed_tools: default_allowed_tools(),
            default_timeout: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
            workspace_base: default_workspace_base(),
        }
    }
}

fn default_allowed_tools() -> Vec<String> {
    ["git", "npm", "mvn", "docker", "kubectl", "go", "make"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_max_concurrent() -> usize {
    10
}

fn default_workspace_base() -> String {
    "workspace".to_string()
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
