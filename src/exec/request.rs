// src/exec/request.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One tool invocation as requested by a caller.
///
/// `env` holds ordered `KEY=VALUE` overrides applied on top of the server's
/// own environment; for a repeated key the later entry wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(default)]
    pub tool: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    #[serde(default)]
    pub env: Vec<String>,

    /// `None` or `0` means "use the configured default".
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl ExecutionRequest {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ..Self::default()
        }
    }

    /// Positive timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        positive_timeout(self.timeout_seconds)
    }

    /// Working directory, treating an empty path as unset.
    pub fn work_dir(&self) -> Option<&Path> {
        non_empty_path(self.work_dir.as_deref())
    }

    /// Env overrides as `(key, value)` pairs, in request order.
    pub fn env_pairs(&self) -> Vec<(&str, &str)> {
        parse_env_entries(&self.env)
    }
}

/// Split `KEY=VALUE` entries. Entries without `=` or with an empty key are
/// skipped; the value may itself contain `=`.
pub fn parse_env_entries(entries: &[String]) -> Vec<(&str, &str)> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

pub(crate) fn positive_timeout(seconds: Option<u64>) -> Option<Duration> {
    seconds.filter(|s| *s > 0).map(Duration::from_secs)
}

pub(crate) fn non_empty_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}
