// src/exec/mod.rs

//! Process execution layer.
//!
//! This module launches allowlisted tools with `tokio::process::Command`,
//! captures their output and normalizes how they ended.
//!
//! - [`request`] / [`result`] hold the request and result types.
//! - [`deadline`] resolves the single deadline an execution runs under.
//! - [`output`] drains stdout/stderr into buffers and an optional live sink.
//! - [`executor`] owns the execution unit itself.

pub mod deadline;
pub mod executor;
pub mod output;
pub mod request;
pub mod result;

pub use deadline::Deadline;
pub use executor::Executor;
pub use output::{Channel, LineSink, OutputLine, SinkClosed};
pub use request::ExecutionRequest;
pub use result::{ExecutionResult, Termination};
