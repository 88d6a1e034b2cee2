use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use stepexec::errors::PolicyError;
use stepexec::exec::result::{NO_EXIT_CODE, TIMED_OUT_MESSAGE};
use stepexec::exec::{Channel, Deadline, ExecutionRequest, ExecutionResult, LineSink, OutputLine};
use stepexec::pipeline::StepExecutor;

/// What the fake does when asked to run a given tool.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Exit 0 after emitting these stdout lines.
    Succeed(Vec<String>),
    /// Exit with `code` after emitting these stderr lines.
    Fail { code: i32, stderr: Vec<String> },
    /// Succeed after sleeping, or time out if the deadline comes first.
    Delay(Duration),
    /// Never finish on its own; times out at the resolved deadline.
    Hang,
    /// Rejected by the allowlist.
    Reject,
}

/// One `execute_step` call as seen by the fake.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: ExecutionRequest,
    pub enclosing: Option<Deadline>,
}

/// A `StepExecutor` that never spawns processes.
///
/// Outcomes are scripted per tool; unscripted tools succeed silently.
/// Every call is recorded with the composed request and the enclosing
/// deadline it received.
#[derive(Clone)]
pub struct FakeStepExecutor {
    outcomes: Arc<HashMap<String, FakeOutcome>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    default_timeout: Duration,
}

impl FakeStepExecutor {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            default_timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_outcome(mut self, tool: &str, outcome: FakeOutcome) -> Self {
        Arc::make_mut(&mut self.outcomes).insert(tool.to_string(), outcome);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executed_tools(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.request.tool).collect()
    }

    async fn run(
        &self,
        request: &ExecutionRequest,
        enclosing: Option<Deadline>,
        sink: Option<&dyn LineSink>,
    ) -> Result<ExecutionResult, PolicyError> {
        self.calls.lock().unwrap().push(RecordedCall {
            request: request.clone(),
            enclosing,
        });

        let outcome = self
            .outcomes
            .get(&request.tool)
            .cloned()
            .unwrap_or(FakeOutcome::Succeed(Vec::new()));
        let deadline = Deadline::resolve(request.timeout(), enclosing, self.default_timeout);
        let started_at = Utc::now();
        let mut result = ExecutionResult::not_started(
            format!("fake-{}", self.calls.lock().unwrap().len()),
            &request.tool,
            &request.args,
            "",
        );
        result.started_at = started_at;

        match outcome {
            FakeOutcome::Reject => {
                return Err(PolicyError::ToolNotAllowed {
                    tool: request.tool.clone(),
                    allowed: Vec::new(),
                });
            }
            FakeOutcome::Succeed(lines) => {
                result.stdout = deliver(sink, Channel::Stdout, &lines).await;
                mark_exit(&mut result, 0);
            }
            FakeOutcome::Fail { code, stderr } => {
                result.stderr = deliver(sink, Channel::Stderr, &stderr).await;
                mark_exit(&mut result, code);
            }
            FakeOutcome::Delay(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => mark_exit(&mut result, 0),
                    _ = tokio::time::sleep_until(deadline.instant()) => mark_timed_out(&mut result),
                }
            }
            FakeOutcome::Hang => {
                tokio::time::sleep_until(deadline.instant()).await;
                mark_timed_out(&mut result);
            }
        }

        result.ended_at = Utc::now();
        Ok(result)
    }
}

impl Default for FakeStepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutor for FakeStepExecutor {
    fn execute_step<'a>(
        &'a self,
        request: &'a ExecutionRequest,
        enclosing: Option<Deadline>,
        sink: Option<&'a dyn LineSink>,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionResult, PolicyError>> + Send + 'a>> {
        Box::pin(self.run(request, enclosing, sink))
    }
}

async fn deliver(sink: Option<&dyn LineSink>, channel: Channel, lines: &[String]) -> String {
    let mut buffer = String::new();
    for line in lines {
        buffer.push_str(line);
        buffer.push('\n');
        if let Some(sink) = sink {
            let _ = sink
                .deliver(OutputLine {
                    channel,
                    text: line.clone(),
                })
                .await;
        }
    }
    buffer
}

fn mark_exit(result: &mut ExecutionResult, code: i32) {
    result.exit_code = code;
    result.success = code == 0;
    result.error = (code != 0).then(|| format!("exit status: {code}"));
}

fn mark_timed_out(result: &mut ExecutionResult) {
    result.exit_code = NO_EXIT_CODE;
    result.success = false;
    result.timed_out = true;
    result.error = Some(TIMED_OUT_MESSAGE.to_string());
}
