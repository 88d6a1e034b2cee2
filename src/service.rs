// src/service.rs

//! Transport-independent executor service.
//!
//! `ExecutorService` exposes the seven operations callers use (execute,
//! execute with streaming, pipeline, pipeline with streaming, cancel, list,
//! health) on top of the execution layer. The HTTP server in
//! [`crate::server`] is a thin adapter over it; the `execute` CLI subcommand
//! uses it directly.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::info;

use crate::config::ExecutorConfig;
use crate::errors::PolicyError;
use crate::exec::{Channel, ExecutionRequest, ExecutionResult, Executor, LineSink, OutputLine, SinkClosed};
use crate::pipeline::{PipelineEvent, PipelineRequest, PipelineResult, PipelineRunner};
use crate::policy::ToolPolicy;
use crate::registry::{CancelOutcome, ProcessInfo, ProcessRegistry};

/// Items of a streamed single execution, in delivery order per channel,
/// followed by exactly one `Result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ExecutionEvent {
    #[serde(rename = "stdout")]
    StdoutLine(String),
    #[serde(rename = "stderr")]
    StderrLine(String),
    Result(ExecutionResult),
}

impl ExecutionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::StdoutLine(_) => "stdout",
            ExecutionEvent::StderrLine(_) => "stderr",
            ExecutionEvent::Result(_) => "result",
        }
    }
}

impl LineSink for mpsc::Sender<ExecutionEvent> {
    fn deliver(
        &self,
        line: OutputLine,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkClosed>> + Send + '_>> {
        let event = match line.channel {
            Channel::Stdout => ExecutionEvent::StdoutLine(line.text),
            Channel::Stderr => ExecutionEvent::StderrLine(line.text),
        };
        Box::pin(async move { self.send(event).await.map_err(|_| SinkClosed) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningProcesses {
    pub processes: Vec<ProcessInfo>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub running_count: usize,
    pub max_concurrent: usize,
    pub uptime_seconds: f64,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExecutorService {
    executor: Executor,
    pipelines: PipelineRunner<Executor>,
    max_concurrent: usize,
    started: Instant,
}

impl ExecutorService {
    pub fn new(executor: Executor, workspace_base: &str, max_concurrent: usize) -> Self {
        let pipelines = PipelineRunner::new(executor.clone()).with_workspace_base(workspace_base);
        Self {
            executor,
            pipelines,
            max_concurrent,
            started: Instant::now(),
        }
    }

    /// Build the service from `[executor]` config with a fresh registry.
    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        let executor = Executor::new(
            ToolPolicy::new(&cfg.allowed_tools),
            ProcessRegistry::new(),
            cfg.default_timeout(),
        );
        Self::new(executor, &cfg.workspace_base, cfg.max_concurrent)
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn registry(&self) -> &ProcessRegistry {
        self.executor.registry()
    }

    pub fn allowed_tools(&self) -> &[String] {
        self.executor.policy().allowed_tools()
    }

    /// Allowlist check without running anything. Streaming transports call
    /// this before opening a stream.
    pub fn check_tool(&self, tool: &str) -> Result<(), PolicyError> {
        self.executor.policy().check(tool)
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, PolicyError> {
        self.executor.execute(request, None).await
    }

    /// Execute while forwarding output lines to `events`, then send the
    /// final result on the same channel. The result is also returned.
    pub async fn execute_stream(
        &self,
        request: &ExecutionRequest,
        events: &mpsc::Sender<ExecutionEvent>,
    ) -> Result<ExecutionResult, PolicyError> {
        let result = self.executor.execute(request, Some(events as &dyn LineSink)).await?;
        if events.send(ExecutionEvent::Result(result.clone())).await.is_err() {
            info!(process_id = %result.process_id, "stream observer gone before final result");
        }
        Ok(result)
    }

    pub async fn execute_pipeline(&self, request: &PipelineRequest) -> PipelineResult {
        self.pipelines.run(request).await
    }

    pub async fn execute_pipeline_stream(
        &self,
        request: &PipelineRequest,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> PipelineResult {
        self.pipelines.run_streaming(request, events).await
    }

    pub fn cancel_process(&self, process_id: &str) -> CancelOutcome {
        let outcome = self.registry().cancel(process_id);
        info!(process_id = %process_id, success = outcome.success, "cancel requested");
        outcome
    }

    pub fn running_processes(&self) -> RunningProcesses {
        let processes = self.registry().snapshot();
        RunningProcesses {
            count: processes.len(),
            processes,
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            running_count: self.registry().len(),
            max_concurrent: self.max_concurrent,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
            checked_at: Utc::now(),
        }
    }

    /// Cancel every running process. Used when the shutdown grace period
    /// runs out.
    pub fn cancel_all(&self) -> usize {
        self.registry().cancel_all()
    }
}
