// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, StepexecError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = StepexecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.server, raw.executor, raw.logging))
    }
}

pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_server(cfg)?;
    validate_executor(cfg)?;
    validate_logging(cfg)?;
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.host.trim().is_empty() {
        return Err(StepexecError::ConfigError(
            "[server].host must not be empty".to_string(),
        ));
    }
    if cfg.server.shutdown_grace_secs == 0 {
        return Err(StepexecError::ConfigError(
            "[server].shutdown_grace_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor(cfg: &RawConfigFile) -> Result<()> {
    let executor = &cfg.executor;

    if executor.default_timeout == 0 {
        return Err(StepexecError::ConfigError(
            "[executor].default_timeout must be >= 1 second (got 0)".to_string(),
        ));
    }
    if executor.max_concurrent == 0 {
        return Err(StepexecError::ConfigError(
            "[executor].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }
    if let Some(pos) = executor
        .allowed_tools
        .iter()
        .position(|t| t.trim().is_empty())
    {
        return Err(StepexecError::ConfigError(format!(
            "[executor].allowed_tools entry #{pos} is blank"
        )));
    }
    Ok(())
}

fn validate_logging(cfg: &RawConfigFile) -> Result<()> {
    if crate::logging::parse_level_str(&cfg.logging.level).is_none() {
        return Err(StepexecError::ConfigError(format!(
            "[logging].level '{}' is not one of error, warn, info, debug, trace",
            cfg.logging.level
        )));
    }
    Ok(())
}
