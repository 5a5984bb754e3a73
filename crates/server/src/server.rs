//! Router assembly and serving.
//!
//! Requests pass through request tracing and a per-request timeout before
//! reaching a handler. Shutdown on CTRL+C or SIGTERM stops accepting
//! connections and drains in-flight requests.

use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{handlers, state::AppState};

/// Builds the router with every route and middleware.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::liveness_check))
        .route("/ready", get(handlers::readiness_check));

    let install_routes = Router::new()
        .route("/auth", get(handlers::begin_install))
        .route("/callback", get(handlers::complete_install));

    let api_routes = Router::new()
        .route("/stats", get(handlers::get_stats))
        .route("/disconnect", post(handlers::disconnect))
        .route("/proxy/{tenant}", post(handlers::forward_proxy))
        .route("/webhooks/{tenant}", post(handlers::receive_webhook));

    Router::new()
        .merge(health_routes)
        .merge(install_routes)
        .merge(api_routes)
        .layer(TimeoutLayer::with_status_code(StatusCode::GATEWAY_TIMEOUT, request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `state` on `addr` until a shutdown signal arrives.
///
/// # Errors
///
/// Returns `std::io::Error` when the address cannot be bound.
pub async fn start_server(state: AppState, addr: SocketAddr, request_timeout: Duration) -> Result<(), std::io::Error> {
    let app = create_router(state, request_timeout);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install CTRL+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received CTRL+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
