// src/server/mod.rs

//! HTTP/SSE transport over [`ExecutorService`].
//!
//! On Ctrl-C or SIGTERM the listener stops accepting and in-flight calls get
//! `shutdown_grace_secs` to finish. Whatever is still registered after that
//! is cancelled, whether or not the drain finished in time.

pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::service::ExecutorService;

pub use error::ApiError;

/// Time allowed for connections to close after stragglers were cancelled.
const FORCED_STOP_WAIT: Duration = Duration::from_secs(5);

pub fn router(service: ExecutorService) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/execute", post(routes::execute))
        .route("/v1/execute/stream", post(routes::execute_stream))
        .route("/v1/pipelines", post(routes::execute_pipeline))
        .route("/v1/pipelines/stream", post(routes::execute_pipeline_stream))
        .route("/v1/processes", get(routes::running_processes))
        .route("/v1/processes/{id}/cancel", post(routes::cancel_process))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Bind and serve until a shutdown signal, then drain.
pub async fn serve(cfg: &ServerConfig, service: ExecutorService) -> Result<()> {
    let address = cfg.address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(address = %listener.local_addr()?, "executor server listening");

    serve_on(listener, service, shutdown_signal(), cfg.shutdown_grace()).await
}

/// Serve on an already bound listener until `signal` resolves.
pub async fn serve_on<F>(
    listener: TcpListener,
    service: ExecutorService,
    signal: F,
    grace: Duration,
) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send,
{
    let stop = Arc::new(Notify::new());
    let trigger = Arc::clone(&stop);
    let server = axum::serve(listener, router(service.clone()))
        .with_graceful_shutdown(async move { trigger.notified().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => return res.context("server error"),
        _ = signal => {}
    }

    info!(grace_secs = grace.as_secs(), running = service.registry().len(), "shutdown requested; draining");
    stop.notify_one();

    let drained = match tokio::time::timeout(grace, &mut server).await {
        Ok(res) => {
            res.context("server error during drain")?;
            true
        }
        Err(_) => false,
    };

    // Streams whose clients went away leave their executions running.
    let cancelled = service.cancel_all();
    if cancelled > 0 {
        warn!(cancelled, drained, "cancelled processes still running at shutdown");
    }
    if !drained && tokio::time::timeout(FORCED_STOP_WAIT, &mut server).await.is_err() {
        warn!("connections still open after forced stop");
    }

    info!("executor server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
