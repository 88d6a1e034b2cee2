// src/server/routes.rs

//! HTTP handlers. Each one is a thin adapter over [`ExecutorService`].

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::exec::{ExecutionRequest, ExecutionResult};
use crate::pipeline::{PipelineEvent, PipelineRequest, PipelineResult};
use crate::registry::CancelOutcome;
use crate::service::{ExecutionEvent, ExecutorService, HealthReport, RunningProcesses};

use super::error::ApiError;

/// Events buffered per stream before the producer waits for the client.
pub const STREAM_BUFFER: usize = 256;
pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

type ApiResult<T> = Result<T, ApiError>;

pub async fn execute(
    State(service): State<ExecutorService>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> ApiResult<Json<ExecutionResult>> {
    let Json(request) = payload?;
    require_tool(&request)?;
    let result = service.execute(&request).await?;
    Ok(Json(result))
}

pub async fn execute_stream(
    State(service): State<ExecutorService>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> ApiResult<Sse<KeepAliveStream<impl Stream<Item = Result<Event, Infallible>>>>> {
    let Json(request) = payload?;
    require_tool(&request)?;
    service.check_tool(&request.tool)?;

    let (tx, rx) = mpsc::channel::<ExecutionEvent>(STREAM_BUFFER);
    tokio::spawn(async move {
        if let Err(err) = service.execute_stream(&request, &tx).await {
            warn!(error = %err, "streamed execution rejected after stream opened");
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok(sse_event(event.kind(), &event)));
    Ok(sse(stream))
}

pub async fn execute_pipeline(
    State(service): State<ExecutorService>,
    payload: Result<Json<PipelineRequest>, JsonRejection>,
) -> ApiResult<Json<PipelineResult>> {
    let Json(request) = payload?;
    Ok(Json(service.execute_pipeline(&request).await))
}

pub async fn execute_pipeline_stream(
    State(service): State<ExecutorService>,
    payload: Result<Json<PipelineRequest>, JsonRejection>,
) -> ApiResult<Sse<KeepAliveStream<impl Stream<Item = Result<Event, Infallible>>>>> {
    let Json(request) = payload?;

    let (tx, rx) = mpsc::channel::<PipelineEvent>(STREAM_BUFFER);
    tokio::spawn(async move {
        service.execute_pipeline_stream(&request, &tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok(sse_event(event.kind(), &event)));
    Ok(sse(stream))
}

pub async fn cancel_process(
    State(service): State<ExecutorService>,
    Path(process_id): Path<String>,
) -> Json<CancelOutcome> {
    Json(service.cancel_process(&process_id))
}

pub async fn running_processes(State(service): State<ExecutorService>) -> Json<RunningProcesses> {
    Json(service.running_processes())
}

pub async fn health(State(service): State<ExecutorService>) -> Json<HealthReport> {
    Json(service.health())
}

fn require_tool(request: &ExecutionRequest) -> ApiResult<()> {
    if request.tool.trim().is_empty() {
        return Err(ApiError::BadRequest("tool is required".to_string()));
    }
    Ok(())
}

fn sse_event<T: Serialize>(kind: &'static str, payload: &T) -> Event {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(kind).data(data)
}

fn sse<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
