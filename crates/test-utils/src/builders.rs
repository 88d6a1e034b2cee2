use std::path::PathBuf;

use stepexec::exec::ExecutionRequest;
use stepexec::pipeline::{PipelineRequest, Step};

/// Builder for `ExecutionRequest`.
pub struct ExecutionRequestBuilder {
    request: ExecutionRequest,
}

impl ExecutionRequestBuilder {
    pub fn new(tool: &str) -> Self {
        Self {
            request: ExecutionRequest::new(tool),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.request.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request.work_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, entry: &str) -> Self {
        self.request.env.push(entry.to_string());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.request.timeout_seconds = Some(secs);
        self
    }

    pub fn build(self) -> ExecutionRequest {
        self.request
    }
}

/// Builder for `PipelineRequest`.
pub struct PipelineRequestBuilder {
    request: PipelineRequest,
}

impl PipelineRequestBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            request: PipelineRequest {
                name: name.to_string(),
                ..PipelineRequest::default()
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.request.id = id.to_string();
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.request.steps.push(step);
        self
    }

    pub fn workspace(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request.workspace_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, entry: &str) -> Self {
        self.request.env.push(entry.to_string());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.request.timeout_seconds = Some(secs);
        self
    }

    pub fn build(self) -> PipelineRequest {
        self.request
    }
}

/// Builder for a pipeline `Step`.
pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    pub fn new(name: &str, tool: &str) -> Self {
        Self {
            step: Step {
                name: name.to_string(),
                tool: tool.to_string(),
                ..Step::default()
            },
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.step.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.step.work_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, entry: &str) -> Self {
        self.step.env.push(entry.to_string());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.step.timeout_seconds = Some(secs);
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.step.continue_on_error = true;
        self
    }

    pub fn build(self) -> Step {
        self.step
    }
}
