// src/pipeline/runner.rs

//! Async pipeline orchestration.
//!
//! The runner walks the steps strictly in order, composes each step's
//! [`ExecutionRequest`], invokes a [`StepExecutor`] and feeds the outcome into
//! the pure [`PipelineProgress`] state machine. Step failures never surface
//! as errors; they end up in the returned [`PipelineResult`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::PolicyError;
use crate::exec::{Deadline, ExecutionRequest, ExecutionResult, Executor, LineSink, OutputLine, SinkClosed};

use super::model::{PipelineEvent, PipelineRequest, PipelineResult, Step, StepResult};
use super::state::{PipelineProgress, StepFlow};

/// Seam between the orchestrator and whatever runs a single step.
///
/// Production code uses [`Executor`]; tests can provide an implementation
/// that does not spawn processes.
pub trait StepExecutor: Send + Sync {
    fn execute_step<'a>(
        &'a self,
        request: &'a ExecutionRequest,
        enclosing: Option<Deadline>,
        sink: Option<&'a dyn LineSink>,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionResult, PolicyError>> + Send + 'a>>;
}

impl StepExecutor for Executor {
    fn execute_step<'a>(
        &'a self,
        request: &'a ExecutionRequest,
        enclosing: Option<Deadline>,
        sink: Option<&'a dyn LineSink>,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionResult, PolicyError>> + Send + 'a>> {
        Box::pin(self.execute_within(request, enclosing, sink))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRunner<E> {
    executor: E,
    workspace_base: Option<PathBuf>,
}

impl<E: StepExecutor> PipelineRunner<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            workspace_base: None,
        }
    }

    /// Resolve relative pipeline workspaces under `base`. An empty base
    /// disables resolution.
    pub fn with_workspace_base(mut self, base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        self.workspace_base = (!base.as_os_str().is_empty()).then_some(base);
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn run(&self, request: &PipelineRequest) -> PipelineResult {
        self.drive(request, None).await
    }

    /// Run the pipeline and report progress on `events`: `StepStarted`,
    /// every output line as `StepOutput`, `StepCompleted`, and finally one
    /// `PipelineCompleted` carrying the same result that is returned.
    ///
    /// A closed event channel does not stop the pipeline.
    pub async fn run_streaming(
        &self,
        request: &PipelineRequest,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> PipelineResult {
        self.drive(request, Some(events)).await
    }

    async fn drive(
        &self,
        request: &PipelineRequest,
        events: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> PipelineResult {
        let pipeline_id = if request.id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            request.id.clone()
        };
        let total_steps = request.steps.len();

        info!(
            pipeline_id = %pipeline_id,
            name = %request.name,
            steps = total_steps,
            "starting pipeline"
        );

        let deadline = request.timeout().map(Deadline::after);
        let workspace = self.resolve_workspace(request.workspace_dir());
        let mut progress = PipelineProgress::new(pipeline_id, request.name.clone(), total_steps);

        for (index, step) in request.steps.iter().enumerate() {
            if deadline.is_some_and(|d| d.is_elapsed()) {
                warn!(
                    pipeline_id = %progress.pipeline_id(),
                    step_index = index,
                    step_name = %step.name,
                    "pipeline deadline exceeded; remaining steps skipped"
                );
                progress.abort(step.name.clone());
                break;
            }

            progress.begin_step(index);
            let step_request = compose_step_request(request, step, workspace.as_deref());

            info!(
                pipeline_id = %progress.pipeline_id(),
                step_index = index,
                step_name = %step.name,
                tool = %step.tool,
                "executing pipeline step"
            );

            if let Some(events) = events {
                emit(
                    events,
                    PipelineEvent::StepStarted {
                        step_name: step.name.clone(),
                        step_index: index,
                        total_steps,
                        started_at: Utc::now(),
                    },
                )
                .await;
            }

            let sink = events.map(|events| StepSink {
                events,
                step_name: &step.name,
                step_index: index,
            });
            let sink_ref = sink.as_ref().map(|s| s as &dyn LineSink);

            let execute_result = match self
                .executor
                .execute_step(&step_request, deadline, sink_ref)
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        pipeline_id = %progress.pipeline_id(),
                        step_name = %step.name,
                        error = %err,
                        "pipeline step could not be started"
                    );
                    ExecutionResult::not_started(String::new(), &step.tool, &step.args, err.to_string())
                }
            };

            let step_failed = !execute_result.success;
            let step_result = StepResult {
                name: step.name.clone(),
                step_index: index,
                execute_result,
            };
            let completed = step_result.clone();
            let flow = progress.record(step_result, step.continue_on_error);

            if let Some(events) = events {
                emit(events, PipelineEvent::StepCompleted(completed)).await;
            }

            if flow == StepFlow::Halt {
                break;
            }

            // Running out of pipeline budget halts the run even for
            // continue-on-error steps.
            if step_failed && deadline.is_some_and(|d| d.is_elapsed()) {
                warn!(
                    pipeline_id = %progress.pipeline_id(),
                    step_name = %step.name,
                    "pipeline deadline exceeded during step"
                );
                progress.abort(step.name.clone());
                break;
            }
        }

        let result = progress.finish();

        info!(
            pipeline_id = %result.pipeline_id,
            success = result.success,
            completed_steps = result.completed_steps,
            failed_step = %result.failed_step,
            duration_ms = result.total_duration_ms,
            "pipeline completed"
        );

        if let Some(events) = events {
            emit(events, PipelineEvent::PipelineCompleted(result.clone())).await;
        }

        result
    }

    fn resolve_workspace(&self, workspace: Option<&Path>) -> Option<PathBuf> {
        let workspace = workspace?;
        match &self.workspace_base {
            Some(base) if workspace.is_relative() => Some(base.join(workspace)),
            _ => Some(workspace.to_path_buf()),
        }
    }
}

/// Build the execution request for one step.
///
/// Env is the pipeline env followed by the step env, so step keys win.
pub fn compose_step_request(
    pipeline: &PipelineRequest,
    step: &Step,
    workspace: Option<&Path>,
) -> ExecutionRequest {
    ExecutionRequest {
        tool: step.tool.clone(),
        args: step.args.clone(),
        work_dir: step_work_dir(workspace, step.work_dir()),
        env: pipeline.env.iter().chain(step.env.iter()).cloned().collect(),
        timeout_seconds: step.timeout_seconds,
    }
}

/// Directory precedence: step dir under the workspace, then the step dir
/// alone, then the workspace alone, then nothing (inherit the server's).
///
/// An absolute step dir is used as-is even when a workspace is set.
pub fn step_work_dir(workspace: Option<&Path>, step_dir: Option<&Path>) -> Option<PathBuf> {
    match (workspace, step_dir) {
        (Some(workspace), Some(dir)) => Some(workspace.join(dir)),
        (None, Some(dir)) => Some(dir.to_path_buf()),
        (Some(workspace), None) => Some(workspace.to_path_buf()),
        (None, None) => None,
    }
}

async fn emit(events: &mpsc::Sender<PipelineEvent>, event: PipelineEvent) {
    let kind = event.kind();
    if events.send(event).await.is_err() {
        debug!(event = kind, "pipeline observer closed; event dropped");
    }
}

/// Forwards a step's output lines as `StepOutput` events.
struct StepSink<'a> {
    events: &'a mpsc::Sender<PipelineEvent>,
    step_name: &'a str,
    step_index: usize,
}

impl LineSink for StepSink<'_> {
    fn deliver(
        &self,
        line: OutputLine,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkClosed>> + Send + '_>> {
        let event = PipelineEvent::StepOutput {
            step_name: self.step_name.to_string(),
            step_index: self.step_index,
            channel: line.channel,
            line: line.text,
        };
        Box::pin(async move { self.events.send(event).await.map_err(|_| SinkClosed) })
    }
}
