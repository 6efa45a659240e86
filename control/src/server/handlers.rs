//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ControlError;
use crate::models::deployment::DeploymentId;
use crate::models::status::{apply_callback, CallbackStatus, DeploymentStatus, Transition};
use crate::models::Environment;
use crate::publish::domains::ProvisionOutcome;
use crate::publish::BufferSink;
use crate::registry::DeploymentFilter;
use crate::server::auth::{verify, SIGNATURE_HEADER};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Structured error body returned to callers
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: String,
}

fn error_response(e: ControlError) -> (StatusCode, Json<ApiError>) {
    let status = match e.kind() {
        "not_found" => StatusCode::NOT_FOUND,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "precondition_failed" => StatusCode::CONFLICT,
        "upstream_failure" | "partial_failure" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        // Raw internal errors are not exposed to external callers
        "internal error".to_string()
    } else {
        e.to_string()
    };
    (
        status,
        Json(ApiError {
            error: e.kind(),
            message,
        }),
    )
}

fn signature<'a>(headers: &'a HeaderMap) -> Result<&'a str, ControlError> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ControlError::Unauthorized("missing signature header".to_string()))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "caravel-control".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Status update from the external build system
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCallbackRequest {
    pub deployment_id: DeploymentId,

    /// Status label; unknown labels are rejected
    pub status: String,

    #[serde(default)]
    pub build_logs: Option<String>,

    #[serde(default)]
    pub error_message: Option<String>,

    #[serde(default)]
    pub artifact_key: Option<String>,

    #[serde(default)]
    pub build_time_seconds: Option<f64>,
}

/// Build callback response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCallbackResponse {
    pub accepted: bool,

    /// True when a redelivered terminal signal was acknowledged without
    /// any state change
    pub noop: bool,

    pub status: DeploymentStatus,
}

/// Build callback handler.
///
/// Tolerates at-least-once delivery: redelivered terminal statuses are
/// acknowledged no-ops, redelivered log appends are additive.
pub async fn build_callback_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let run = async {
        verify(&state.callback_secret, &body, signature(&headers)?)?;

        let request: BuildCallbackRequest = serde_json::from_slice(&body)?;

        let label = CallbackStatus::parse(&request.status).ok_or_else(|| {
            ControlError::PreconditionFailed(format!("unknown status label '{}'", request.status))
        })?;

        let deployment = state
            .registry
            .deployment(&request.deployment_id)
            .await?
            .ok_or_else(|| {
                ControlError::NotFound(format!("deployment {}", request.deployment_id))
            })?;

        if let Some(logs) = request.build_logs.as_deref() {
            state
                .registry
                .append_build_log(&deployment.id, logs)
                .await?;
        }

        match apply_callback(deployment.status, label)? {
            Transition::Noop => {
                info!(
                    deployment_id = %deployment.id,
                    label = label.as_str(),
                    "redelivered callback acknowledged as no-op"
                );
                Ok(BuildCallbackResponse {
                    accepted: true,
                    noop: true,
                    status: deployment.status,
                })
            }
            Transition::Advanced(target) => {
                if label == CallbackStatus::Uploaded {
                    if let Some(key) = request.artifact_key.as_deref() {
                        state
                            .registry
                            .record_upload(&deployment.id, key, request.build_time_seconds)
                            .await?;
                    }
                }

                let error = request.error_message.as_deref();
                let updated = state
                    .registry
                    .transition_deployment(&deployment.id, target, error)
                    .await?;

                info!(
                    deployment_id = %deployment.id,
                    status = %updated.status,
                    "build callback applied"
                );
                Ok(BuildCallbackResponse {
                    accepted: true,
                    noop: false,
                    status: updated.status,
                })
            }
        }
    };

    match run.await {
        Ok(response) => Ok(Json(response)),
        Err(e) => Err(error_response(e)),
    }
}

/// Environment variable map for the build system
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarsResponse {
    pub deployment_id: DeploymentId,
    pub environment: Environment,
    pub env_vars: std::collections::BTreeMap<String, String>,
}

/// Env-var retrieval handler; signed over the request path since there
/// is no body
pub async fn env_vars_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let run = async {
        let path = format!("/deployments/{}/env", id);
        verify(&state.callback_secret, path.as_bytes(), signature(&headers)?)?;

        let id = DeploymentId::new(id);
        let deployment = state
            .registry
            .deployment(&id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))?;

        let project = state
            .registry
            .project(&deployment.project_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("project {}", deployment.project_id)))?;

        let environment = deployment.environment();
        Ok(EnvVarsResponse {
            deployment_id: id,
            environment,
            env_vars: project.env_vars.for_environment(environment).clone(),
        })
    };

    match run.await {
        Ok(response) => Ok(Json(response)),
        Err(e) => Err(error_response(e)),
    }
}

/// Deployment inspection handler
pub async fn deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let id = DeploymentId::new(id);
    match state.registry.deployment(&id).await {
        Ok(Some(deployment)) => Ok(Json(deployment)),
        Ok(None) => Err(error_response(ControlError::NotFound(format!(
            "deployment {}",
            id
        )))),
        Err(e) => Err(error_response(e)),
    }
}

/// Project deployment listing handler
pub async fn project_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let run = async {
        let project = state
            .registry
            .project_by_slug(&slug)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("project {}", slug)))?;

        state
            .registry
            .list_deployments(&DeploymentFilter::new().with_project(project.id))
            .await
    };

    match run.await {
        Ok(deployments) => Ok(Json(deployments)),
        Err(e) => Err(error_response(e)),
    }
}

/// Cancellation response
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: DeploymentStatus,
}

/// Explicit cancellation; only valid from non-terminal states. The build
/// system observes the status and stops on its own.
pub async fn cancel_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let id = DeploymentId::new(id);
    match state
        .registry
        .transition_deployment(&id, DeploymentStatus::Cancelled, Some("cancelled by operator"))
        .await
    {
        Ok(deployment) => {
            info!(deployment_id = %id, "deployment cancelled");
            Ok(Json(CancelResponse {
                status: deployment.status,
            }))
        }
        Err(e) => Err(error_response(e)),
    }
}

/// Rollback request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    pub deployment_id: DeploymentId,

    #[serde(default = "default_environment")]
    pub environment: Environment,
}

fn default_environment() -> Environment {
    Environment::Production
}

/// Rollback response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResponse {
    pub deployment_id: DeploymentId,
    pub environment: Environment,
}

/// Rollback handler
pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    Path(slug): Path<String>,
    Json(request): Json<RollbackRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let run = async {
        let project = state
            .registry
            .project_by_slug(&slug)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("project {}", slug)))?;

        let log = BufferSink::new();
        state
            .rollback
            .rollback(&project.id, &request.deployment_id, request.environment, &log)
            .await?;

        let contents = log.contents();
        if !contents.is_empty() {
            if let Err(e) = state
                .registry
                .append_build_log(&request.deployment_id, &contents)
                .await
            {
                warn!(deployment_id = %request.deployment_id, error = %e, "rollback log append failed");
            }
        }

        Ok(RollbackResponse {
            deployment_id: request.deployment_id,
            environment: request.environment,
        })
    };

    match run.await {
        Ok(response) => Ok(Json(response)),
        Err(e) => Err(error_response(e)),
    }
}

/// Domain provisioning response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub domain: String,
    pub outcome: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Domain provisioning handler
pub async fn provision_domain_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    match state.provisioner.provision(&name).await {
        Ok(outcome) => {
            let (outcome, detail) = match outcome {
                ProvisionOutcome::Online => ("online", None),
                ProvisionOutcome::PendingCompliance { detail } => {
                    ("pending_compliance", Some(detail))
                }
                ProvisionOutcome::ManualStepRequired => ("manual_step_required", None),
            };
            Ok(Json(ProvisionResponse {
                domain: name,
                outcome,
                detail,
            }))
        }
        Err(e) => Err(error_response(e)),
    }
}
