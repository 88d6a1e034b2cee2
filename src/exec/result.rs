// src/exec/result.rs

use std::process::ExitStatus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code reported when the process did not exit on its own (timeout,
/// cancellation, spawn or wait failure, death by signal).
pub const NO_EXIT_CODE: i32 = -1;

pub const TIMED_OUT_MESSAGE: &str = "command timed out";

/// Normalized outcome of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub process_id: String,
    pub tool: String,
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// A result for an invocation that never produced a process.
    pub fn not_started(
        process_id: impl Into<String>,
        tool: &str,
        args: &[String],
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            process_id: process_id.into(),
            tool: tool.to_string(),
            args: args.to_vec(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: NO_EXIT_CODE,
            success: false,
            error: Some(message.into()),
            timed_out: false,
            started_at: now,
            ended_at: now,
            duration_ms: 0,
        }
    }
}

/// How a supervised process ended.
#[derive(Debug)]
pub enum Termination {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    WaitFailed(std::io::Error),
}

/// Result fields derived from a [`Termination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub exit_code: i32,
    pub success: bool,
    pub timed_out: bool,
    pub error: Option<String>,
}

impl Termination {
    /// Classify the termination.
    ///
    /// Timeout and explicit cancellation produce the same outcome
    /// (`exit_code = -1`, `timed_out = true`, the timed-out message).
    pub fn outcome(&self) -> Outcome {
        match self {
            Termination::Exited(status) if status.success() => Outcome {
                exit_code: 0,
                success: true,
                timed_out: false,
                error: None,
            },
            Termination::Exited(status) => Outcome {
                exit_code: status.code().unwrap_or(NO_EXIT_CODE),
                success: false,
                timed_out: false,
                error: Some(status.to_string()),
            },
            Termination::TimedOut | Termination::Cancelled => Outcome {
                exit_code: NO_EXIT_CODE,
                success: false,
                timed_out: true,
                error: Some(TIMED_OUT_MESSAGE.to_string()),
            },
            Termination::WaitFailed(err) => Outcome {
                exit_code: NO_EXIT_CODE,
                success: false,
                timed_out: false,
                error: Some(format!("failed waiting for command: {err}")),
            },
        }
    }
}
