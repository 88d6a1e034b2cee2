// src/pipeline/state.rs

//! Pure pipeline state machine.
//!
//! `PipelineProgress` owns the bookkeeping of a single run: which step is
//! active, the appended step results, and whether (and where) the pipeline
//! was aborted. It performs no IO and has no Tokio types, so every transition
//! can be unit tested directly. The async runner in [`super::runner`] only
//! feeds it results.
//!
//! ```text
//! NotStarted -> Running(i) -> Running(i+1) -> ... -> Completed
//!                    \
//!                     `-> Aborted(failed_step)
//! ```

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::model::{PipelineResult, StepResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running { step_index: usize },
    Completed { success: bool },
    Aborted { failed_step: String },
}

/// What the runner should do after a step result was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFlow {
    Continue,
    Halt,
}

#[derive(Debug)]
pub struct PipelineProgress {
    pipeline_id: String,
    name: String,
    total_steps: usize,
    step_results: Vec<StepResult>,
    state: PipelineState,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl PipelineProgress {
    pub fn new(pipeline_id: impl Into<String>, name: impl Into<String>, total_steps: usize) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            name: name.into(),
            total_steps,
            step_results: Vec::with_capacity(total_steps),
            state: PipelineState::NotStarted,
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn completed_steps(&self) -> usize {
        self.step_results.len()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Completed { .. } | PipelineState::Aborted { .. }
        )
    }

    pub fn begin_step(&mut self, step_index: usize) {
        if !self.is_terminal() {
            self.state = PipelineState::Running { step_index };
        }
    }

    /// Append a finished step.
    ///
    /// An unsuccessful step without `continue_on_error` aborts the pipeline;
    /// a `continue_on_error` failure is recorded and the run goes on.
    pub fn record(&mut self, result: StepResult, continue_on_error: bool) -> StepFlow {
        let failed = !result.execute_result.success;
        let name = result.name.clone();
        self.step_results.push(result);

        if failed && !continue_on_error {
            self.abort(name);
            StepFlow::Halt
        } else {
            StepFlow::Continue
        }
    }

    /// Stop the pipeline, naming the step responsible. Only the first abort
    /// counts.
    pub fn abort(&mut self, failed_step: impl Into<String>) {
        if !self.is_terminal() {
            self.state = PipelineState::Aborted {
                failed_step: failed_step.into(),
            };
        }
    }

    pub fn finish(mut self) -> PipelineResult {
        if !self.is_terminal() {
            self.state = PipelineState::Completed { success: true };
        }

        let (success, failed_step) = match self.state {
            PipelineState::Aborted { failed_step } => (false, failed_step),
            PipelineState::Completed { success } => (success, String::new()),
            PipelineState::NotStarted | PipelineState::Running { .. } => (true, String::new()),
        };

        PipelineResult {
            pipeline_id: self.pipeline_id,
            name: self.name,
            completed_steps: self.step_results.len(),
            step_results: self.step_results,
            total_steps: self.total_steps,
            success,
            failed_step,
            started_at: self.started_at,
            ended_at: Utc::now(),
            total_duration_ms: self.clock.elapsed().as_millis() as u64,
        }
    }
}
