// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod server;
pub mod service;
pub mod types;

use std::fmt::Write as _;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command, ExecuteArgs};
use crate::config::ConfigFile;
use crate::exec::{ExecutionRequest, ExecutionResult};
use crate::service::ExecutorService;

/// High-level entry point used by `main.rs`.
///
/// `version` needs neither config nor logging. The other subcommands load
/// the configuration and install logging first.
pub async fn run(args: CliArgs) -> Result<()> {
    match &args.command {
        Command::Version => {
            print!("{}", version_text());
            Ok(())
        }
        Command::Server => {
            let cfg = prepare(&args)?;
            let service = ExecutorService::from_config(&cfg.executor);
            info!(
                allowed_tools = ?service.allowed_tools(),
                default_timeout_secs = cfg.executor.default_timeout,
                max_concurrent = cfg.executor.max_concurrent,
                "starting executor"
            );
            server::serve(&cfg.server, service).await
        }
        Command::Execute(exec_args) => {
            let cfg = prepare(&args)?;
            execute_once(&cfg, exec_args).await
        }
    }
}

fn prepare(args: &CliArgs) -> Result<ConfigFile> {
    let cfg = config::load(args.config.as_deref())?;
    logging::init_logging(args.log_level, &cfg.logging)?;
    Ok(cfg)
}

/// One-shot local execution for `stepexec execute`.
async fn execute_once(cfg: &ConfigFile, exec_args: &ExecuteArgs) -> Result<()> {
    if exec_args.tool.trim().is_empty() {
        bail!("tool is required");
    }

    let service = ExecutorService::from_config(&cfg.executor);
    let request = ExecutionRequest {
        tool: exec_args.tool.clone(),
        args: exec_args.arg_list(),
        work_dir: Some(exec_args.workdir.clone()),
        env: exec_args.env.clone(),
        timeout_seconds: Some(exec_args.timeout),
    };
    debug!(?request, "executing locally");

    let result = service.execute(&request).await?;
    print!("{}", render_result(&result));

    if !result.success {
        bail!("command failed with exit code {}", result.exit_code);
    }
    Ok(())
}

pub fn version_text() -> String {
    format!("stepexec v{}\n", env!("CARGO_PKG_VERSION"))
}

/// Human-readable summary printed by `stepexec execute`.
pub fn render_result(result: &ExecutionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Execution Result ===");
    let _ = writeln!(out, "Tool: {}", result.tool);
    let _ = writeln!(out, "Args: {:?}", result.args);
    let _ = writeln!(out, "Exit Code: {}", result.exit_code);
    let _ = writeln!(out, "Duration: {}ms", result.duration_ms);
    let _ = writeln!(out, "Success: {}", result.success);
    if let Some(error) = &result.error {
        let _ = writeln!(out, "Error: {error}");
    }

    if !result.stdout.is_empty() {
        let _ = writeln!(out, "\n--- STDOUT ---\n{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        let _ = writeln!(out, "\n--- STDERR ---\n{}", result.stderr);
    }
    out
}
