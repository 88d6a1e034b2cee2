// src/exec/executor.rs

//! The execution unit: one process, one deadline, two output readers.

use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::PolicyError;
use crate::exec::deadline::Deadline;
use crate::exec::output::{Channel, LineSink, drain_lines};
use crate::exec::request::ExecutionRequest;
use crate::exec::result::{ExecutionResult, Termination};
use crate::policy::ToolPolicy;
use crate::registry::{ProcessRegistry, RunningProcess};

/// How long readers may keep draining after the process was killed. Only
/// matters when a descendant inherited the pipes and outlives the child.
const READER_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Runs allowlisted tools and tracks them in the shared registry.
///
/// Cheap to clone; clones share the policy and the registry.
#[derive(Debug, Clone)]
pub struct Executor {
    policy: ToolPolicy,
    registry: ProcessRegistry,
    default_timeout: Duration,
}

impl Executor {
    pub fn new(policy: ToolPolicy, registry: ProcessRegistry, default_timeout: Duration) -> Self {
        Self {
            policy,
            registry,
            default_timeout,
        }
    }

    pub fn policy(&self) -> &ToolPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `request` to completion.
    ///
    /// Only an allowlist rejection is returned as `Err`; spawn failures,
    /// non-zero exits, timeouts and cancellations are all encoded in the
    /// returned [`ExecutionResult`].
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        sink: Option<&dyn LineSink>,
    ) -> Result<ExecutionResult, PolicyError> {
        self.execute_within(request, None, sink).await
    }

    /// Like [`execute`](Self::execute), with an enclosing deadline that
    /// replaces the configured default and caps the request's own timeout.
    pub async fn execute_within(
        &self,
        request: &ExecutionRequest,
        enclosing: Option<Deadline>,
        sink: Option<&dyn LineSink>,
    ) -> Result<ExecutionResult, PolicyError> {
        self.policy.check(&request.tool)?;
        let deadline = Deadline::resolve(request.timeout(), enclosing, self.default_timeout);
        Ok(self.launch(request, deadline, sink).await)
    }

    async fn launch(
        &self,
        request: &ExecutionRequest,
        deadline: Deadline,
        sink: Option<&dyn LineSink>,
    ) -> ExecutionResult {
        let process_id = Uuid::new_v4().to_string();
        let mut cmd = build_command(request);

        let started_at = Utc::now();
        let clock = Instant::now();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(
                    process_id = %process_id,
                    tool = %request.tool,
                    error = %err,
                    "failed to start command"
                );
                return ExecutionResult::not_started(
                    process_id,
                    &request.tool,
                    &request.args,
                    format!("failed to start command: {err}"),
                );
            }
        };

        // Registered before any output is read, so cancel/list calls see
        // every started process.
        let registration = self.registry.register(RunningProcess::new(
            process_id.clone(),
            request.tool.clone(),
            request.args.clone(),
        ));
        debug!(process_id = %process_id, tool = %request.tool, "process registered");

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            terminate(&mut child, &process_id).await;
            drop(registration);
            return ExecutionResult::not_started(
                process_id,
                &request.tool,
                &request.args,
                "failed to capture process output",
            );
        };

        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        let termination = supervise(
            &mut child,
            Pipes {
                stdout,
                stderr,
                stdout_buf: &mut stdout_buf,
                stderr_buf: &mut stderr_buf,
            },
            deadline,
            registration.handle(),
            sink,
            &process_id,
        )
        .await;
        drop(registration);

        let ended_at = Utc::now();
        let duration = clock.elapsed();
        let outcome = termination.outcome();

        let stop_reason = match termination {
            Termination::TimedOut => Some("deadline"),
            Termination::Cancelled => Some("cancelled"),
            _ => None,
        };
        if let Some(reason) = stop_reason {
            warn!(
                process_id = %process_id,
                tool = %request.tool,
                reason,
                "command stopped before exiting"
            );
        }

        info!(
            process_id = %process_id,
            tool = %request.tool,
            args = ?request.args,
            exit_code = outcome.exit_code,
            duration_ms = duration.as_millis() as u64,
            success = outcome.success,
            "command executed"
        );

        ExecutionResult {
            process_id,
            tool: request.tool.clone(),
            args: request.args.clone(),
            stdout: stdout_buf,
            stderr: stderr_buf,
            exit_code: outcome.exit_code,
            success: outcome.success,
            error: outcome.error,
            timed_out: outcome.timed_out,
            started_at,
            ended_at,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

fn build_command(request: &ExecutionRequest) -> Command {
    let mut cmd = Command::new(&request.tool);
    cmd.args(&request.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = request.work_dir() {
        cmd.current_dir(dir);
    }

    let env = request.env_pairs();
    if env.len() != request.env.len() {
        warn!(
            tool = %request.tool,
            skipped = request.env.len() - env.len(),
            "ignoring env entries not in KEY=VALUE form"
        );
    }
    // Applied in order on top of the inherited environment; later keys win.
    for (key, value) in env {
        cmd.env(key, value);
    }

    cmd
}

struct Pipes<'a> {
    stdout: ChildStdout,
    stderr: ChildStderr,
    stdout_buf: &'a mut String,
    stderr_buf: &'a mut String,
}

/// Drive a started process to termination.
///
/// Both readers are joined before the exit status is awaited, so output of a
/// fast-exiting process is never cut short. The deadline and the cancel
/// signal are watched throughout; either one kills the child, which closes
/// its pipes and unblocks the readers.
async fn supervise(
    child: &mut Child,
    pipes: Pipes<'_>,
    deadline: Deadline,
    handle: &RunningProcess,
    sink: Option<&dyn LineSink>,
    process_id: &str,
) -> Termination {
    let Pipes {
        stdout,
        stderr,
        stdout_buf,
        stderr_buf,
    } = pipes;

    let readers = async {
        tokio::join!(
            drain_lines(stdout, Channel::Stdout, stdout_buf, sink),
            drain_lines(stderr, Channel::Stderr, stderr_buf, sink),
        );
    };
    tokio::pin!(readers);

    let mut readers_done = false;
    let interrupted = tokio::select! {
        () = &mut readers => {
            readers_done = true;
            None
        }
        () = sleep_until(deadline.instant()) => Some(Termination::TimedOut),
        () = handle.cancelled() => Some(Termination::Cancelled),
    };

    let termination = match interrupted {
        Some(termination) => termination,
        None => tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Termination::Exited(status),
                Err(err) => Termination::WaitFailed(err),
            },
            () = sleep_until(deadline.instant()) => Termination::TimedOut,
            () = handle.cancelled() => Termination::Cancelled,
        },
    };

    if matches!(termination, Termination::TimedOut | Termination::Cancelled) {
        terminate(child, process_id).await;
        if !readers_done && timeout(READER_DRAIN_GRACE, &mut readers).await.is_err() {
            warn!(
                process_id = %process_id,
                "output pipes still open after kill; abandoning readers"
            );
        }
    }

    termination
}

async fn terminate(child: &mut Child, process_id: &str) {
    if let Err(err) = child.start_kill() {
        debug!(process_id = %process_id, error = %err, "kill failed; process likely already exited");
    }
    if let Err(err) = child.wait().await {
        warn!(process_id = %process_id, error = %err, "failed to reap killed process");
    }
}
