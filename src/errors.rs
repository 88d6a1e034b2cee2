// src/errors.rs

//! Crate-wide error types.
//!
//! Most failure modes of a command (spawn failure, non-zero exit, timeout,
//! cancellation) are *not* errors here: they are encoded into
//! [`ExecutionResult`](crate::exec::ExecutionResult). Only an allowlist
//! rejection is raised at the execution boundary.

use thiserror::Error;

/// Pre-spawn rejection. No process is started and nothing is registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("tool '{tool}' is not allowed. Allowed tools: {allowed:?}")]
    ToolNotAllowed { tool: String, allowed: Vec<String> },
}

#[derive(Error, Debug)]
pub enum StepexecError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StepexecError>;
