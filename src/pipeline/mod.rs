// src/pipeline/mod.rs

//! Multi-step pipelines.
//!
//! A pipeline is a fixed, ordered list of steps sharing one deadline, one
//! workspace root and a common environment. There is no branching or
//! fan-out: step N+1 starts only after step N's result is final.
//!
//! The pure state machine lives in [`state`]; the async shell that invokes
//! the execution layer is [`runner`].

pub mod model;
pub mod runner;
pub mod state;

pub use model::{PipelineEvent, PipelineRequest, PipelineResult, Step, StepResult};
pub use runner::{PipelineRunner, StepExecutor, compose_step_request, step_work_dir};
pub use state::{PipelineProgress, PipelineState, StepFlow};
