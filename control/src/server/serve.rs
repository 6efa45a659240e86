//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ControlError;
use crate::server::handlers::{
    build_callback_handler, cancel_handler, deployment_handler, env_vars_handler, health_handler,
    project_deployments_handler, provision_domain_handler, rollback_handler, version_handler,
};
use crate::server::state::ServerState;

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ControlError>>, ControlError> {
    let app = Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Build system callbacks
        .route("/callbacks/build", post(build_callback_handler))
        // Deployments
        .route("/deployments/{id}", get(deployment_handler))
        .route("/deployments/{id}/env", get(env_vars_handler))
        .route("/deployments/{id}/cancel", post(cancel_handler))
        // Projects
        .route("/projects/{slug}/deployments", get(project_deployments_handler))
        .route("/projects/{slug}/rollback", post(rollback_handler))
        // Custom domains
        .route("/domains/{domain}/provision", post(provision_domain_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ControlError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ControlError::ServerError(e.to_string()))
    });

    Ok(handle)
}
