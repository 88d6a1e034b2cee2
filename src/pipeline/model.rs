// src/pipeline/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exec::request::{non_empty_path, positive_timeout};
use crate::exec::{Channel, ExecutionResult};

/// An ordered list of steps run as one unit.
///
/// ```json
/// {
///   "id": "build-42",
///   "name": "build",
///   "workspaceDir": "/ws/repo",
///   "env": ["CI=true"],
///   "timeoutSeconds": 1800,
///   "steps": [
///     { "name": "install", "tool": "npm", "args": ["ci"] },
///     { "name": "lint", "tool": "npm", "args": ["run", "lint"], "continueOnError": true },
///     { "name": "test", "tool": "npm", "args": ["test"], "workDir": "packages/app" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    /// Caller-supplied id; a blank id is replaced by a generated one.
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,

    /// `KEY=VALUE` entries shared by every step; step entries come after.
    #[serde(default)]
    pub env: Vec<String>,

    /// Budget for the whole pipeline, not reset per step.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl PipelineRequest {
    pub fn timeout(&self) -> Option<Duration> {
        positive_timeout(self.timeout_seconds)
    }

    pub fn workspace_dir(&self) -> Option<&Path> {
        non_empty_path(self.workspace_dir.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub name: String,
    pub tool: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Relative paths are joined under the pipeline workspace.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    #[serde(default)]
    pub env: Vec<String>,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Record this step's failure but keep going.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Step {
    pub fn work_dir(&self) -> Option<&Path> {
        non_empty_path(self.work_dir.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: String,
    pub step_index: usize,
    pub execute_result: ExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub pipeline_id: String,
    pub name: String,
    pub step_results: Vec<StepResult>,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub success: bool,
    /// Name of the step that failed the pipeline; empty when none did.
    pub failed_step: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_duration_ms: u64,
}

/// Progress reported by a streaming pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    #[serde(rename_all = "camelCase")]
    StepStarted {
        step_name: String,
        step_index: usize,
        total_steps: usize,
        started_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StepOutput {
        step_name: String,
        step_index: usize,
        channel: Channel,
        line: String,
    },
    StepCompleted(StepResult),
    PipelineCompleted(PipelineResult),
}

impl PipelineEvent {
    /// Short event name, used as the SSE event type.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::StepStarted { .. } => "step_started",
            PipelineEvent::StepOutput { .. } => "step_output",
            PipelineEvent::StepCompleted(_) => "step_completed",
            PipelineEvent::PipelineCompleted(_) => "pipeline_completed",
        }
    }
}
