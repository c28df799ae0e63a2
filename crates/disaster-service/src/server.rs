//! HTTP server setup.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes;
use crate::state::AppState;

pub type ServerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Build the router with every endpoint and middleware layer.
///
/// Requests running longer than `request_timeout` are answered with
/// `408 Request Timeout`.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/ping", get(routes::ping))
        .route("/health", get(routes::health))
        .route("/api/disasters", get(routes::list_disasters))
        .route("/api/ingest", post(routes::trigger_ingest))
        .route("/detect", post(routes::detect))
        .route("/get_similar_disasters", post(routes::similar_disasters))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Serve on an already-bound listener until `shutdown_signal` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    request_timeout: Duration,
    shutdown_signal: F,
) -> ServerResult
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state, request_timeout);
    info!("HTTP server ready on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Bind `addr` and serve with graceful shutdown.
pub async fn run_server_with_shutdown<F>(
    addr: SocketAddr,
    state: AppState,
    request_timeout: Duration,
    shutdown_signal: F,
) -> ServerResult
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting HTTP server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", addr, e))?;
    serve(listener, state, request_timeout, shutdown_signal).await
}
