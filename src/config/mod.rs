// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file and apply environment overrides (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, default_config_path, load, load_from_path};
pub use model::{ConfigFile, ExecutorConfig, LoggingConfig, RawConfigFile, ServerConfig};
pub use validate::validate_config;
