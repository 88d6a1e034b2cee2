// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `stepexec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stepexec",
    version,
    about = "Process executor for CI/CD build pipelines.",
    long_about = "Runs allowlisted tools and multi-step build pipelines on behalf of a remote \
                  orchestrator, streaming output live and supporting cancellation."
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `stepexec.toml` in the current working directory if it
    /// exists, otherwise built-in defaults.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `[logging].level` from the config is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start the HTTP executor server.
    Server,

    /// Execute a single command locally and print its result.
    Execute(ExecuteArgs),

    /// Print version information.
    Version,
}

#[derive(Debug, Clone, Args)]
#[command(after_help = "Examples:\n  \
    stepexec execute --tool git --args \"clone,https://github.com/user/repo.git\"\n  \
    stepexec execute --tool npm --args install --workdir /path/to/project")]
pub struct ExecuteArgs {
    /// Tool to execute (must be allowlisted).
    #[arg(short, long)]
    pub tool: String,

    /// Comma-separated arguments.
    #[arg(short, long, default_value = "")]
    pub args: String,

    /// Working directory.
    #[arg(short, long, default_value = ".")]
    pub workdir: PathBuf,

    /// Environment override, `KEY=VALUE`. Repeatable.
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Timeout in seconds (0 = configured default).
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,
}

impl ExecuteArgs {
    /// Split `--args` on commas, trimming each entry.
    pub fn arg_list(&self) -> Vec<String> {
        if self.args.is_empty() {
            return Vec::new();
        }
        self.args.split(',').map(|a| a.trim().to_string()).collect()
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
