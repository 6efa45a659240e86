//! HTTP handler tests for the build callback and signed endpoints

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use secrecy::SecretString;

use caravel_control::edge::artifacts::MemoryArtifactStore;
use caravel_control::edge::dns::MemoryDnsProvider;
use caravel_control::edge::functions::MemoryFunctionPlatform;
use caravel_control::edge::hostnames::MemoryEdgeHostnames;
use caravel_control::edge::routing::MemoryRoutingStore;
use caravel_control::edge::CallLog;
use caravel_control::models::deployment::{Deployment, Revision};
use caravel_control::models::project::{Project, ProjectType};
use caravel_control::models::status::DeploymentStatus;
use caravel_control::publish::{DomainProvisioner, Finalizer, GarbageCollector, RollbackEngine};
use caravel_control::registry::{MemoryRegistry, Registry};
use caravel_control::server::auth::{sign, SIGNATURE_HEADER};
use caravel_control::server::handlers::{build_callback_handler, env_vars_handler};
use caravel_control::server::state::ServerState;

const SECRET: &str = "test-secret";

fn state(registry: Arc<MemoryRegistry>) -> Arc<ServerState> {
    let calls = CallLog::new();
    let routing = Arc::new(MemoryRoutingStore::with_log(calls.clone()));
    let functions = Arc::new(MemoryFunctionPlatform::with_log(calls.clone()));
    let dns = Arc::new(MemoryDnsProvider::with_log(calls.clone()));
    let hostnames = Arc::new(MemoryEdgeHostnames::with_log(calls.clone()));
    let artifacts = Arc::new(MemoryArtifactStore::with_log(calls));
    let gc = Arc::new(GarbageCollector::new(registry.clone(), artifacts, 3));
    let finalizer = Arc::new(Finalizer::new(
        registry.clone(),
        routing.clone(),
        functions,
        dns.clone(),
        gc,
        "caravel.app",
        "ingress.caravel.app",
    ));
    let rollback = Arc::new(RollbackEngine::new(registry.clone(), finalizer));
    let provisioner = Arc::new(DomainProvisioner::new(
        registry.clone(),
        routing,
        dns,
        hostnames,
        "caravel.app",
        "edge.caravel.app",
    ));
    Arc::new(ServerState::new(
        registry,
        rollback,
        provisioner,
        SecretString::from(SECRET),
    ))
}

fn signed_headers(payload: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let signature = sign(&SecretString::from(SECRET), payload);
    headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
    headers
}

async fn response_parts(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn seed_deployment(
    registry: &MemoryRegistry,
    status: DeploymentStatus,
) -> (Project, Deployment) {
    let project = Project::new("docs", ProjectType::Static);
    registry.insert_project(&project).await.unwrap();
    let mut deployment = Deployment::new(project.id.clone(), Revision::default(), false);
    deployment.status = status;
    registry.insert_deployment(&deployment).await.unwrap();
    (project, deployment)
}

#[tokio::test]
async fn test_callback_advances_status() {
    let registry = Arc::new(MemoryRegistry::new());
    let state = state(registry.clone());
    let (_, deployment) = seed_deployment(&registry, DeploymentStatus::Queued).await;

    let body = serde_json::json!({
        "deploymentId": deployment.id,
        "status": "cloning",
        "buildLogs": "Cloning repository...\n",
    })
    .to_string();

    let response = build_callback_handler(
        State(state),
        signed_headers(body.as_bytes()),
        Bytes::from(body),
    )
    .await
    .into_response();
    let (status, json) = response_parts(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["accepted"], true);
    assert_eq!(json["noop"], false);
    assert_eq!(json["status"], "cloning");

    let updated = registry.deployment(&deployment.id).await.unwrap().unwrap();
    assert_eq!(updated.status, DeploymentStatus::Cloning);
    assert!(updated.build_log.contains("Cloning repository"));
}

#[tokio::test]
async fn test_callback_rejects_missing_signature() {
    let registry = Arc::new(MemoryRegistry::new());
    let state = state(registry.clone());
    let (_, deployment) = seed_deployment(&registry, DeploymentStatus::Queued).await;

    let body = serde_json::json!({
        "deploymentId": deployment.id,
        "status": "cloning",
    })
    .to_string();

    let response = build_callback_handler(State(state), HeaderMap::new(), Bytes::from(body))
        .await
        .into_response();
    let (status, _) = response_parts(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let untouched = registry.deployment(&deployment.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, DeploymentStatus::Queued);
}

#[tokio::test]
async fn test_callback_rejects_tampered_body() {
    let registry = Arc::new(MemoryRegistry::new());
    let state = state(registry.clone());
    let (_, deployment) = seed_deployment(&registry, DeploymentStatus::Queued).await;

    let body = serde_json::json!({
        "deploymentId": deployment.id,
        "status": "cloning",
    })
    .to_string();
    let headers = signed_headers(b"something else entirely");

    let response = build_callback_handler(State(state), headers, Bytes::from(body))
        .await
        .into_response();
    let (status, _) = response_parts(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_callback_rejects_unknown_label() {
    let registry = Arc::new(MemoryRegistry::new());
    let state = state(registry.clone());
    let (_, deployment) = seed_deployment(&registry, DeploymentStatus::Queued).await;

    let body = serde_json::json!({
        "deploymentId": deployment.id,
        "status": "compiling",
    })
    .to_string();

    let response = build_callback_handler(
        State(state),
        signed_headers(body.as_bytes()),
        Bytes::from(body),
    )
    .await
    .into_response();
    let (status, json) = response_parts(response).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "precondition_failed");
}

#[tokio::test]
async fn test_uploaded_callback_records_artifact() {
    let registry = Arc::new(MemoryRegistry::new());
    let state = state(registry.clone());
    let (_, deployment) = seed_deployment(&registry, DeploymentStatus::Uploading).await;

    let body = serde_json::json!({
        "deploymentId": deployment.id,
        "status": "uploaded",
        "artifactKey": "packages/docs/pkg-1",
        "buildTimeSeconds": 42.5,
    })
    .to_string();

    let response = build_callback_handler(
        State(state),
        signed_headers(body.as_bytes()),
        Bytes::from(body),
    )
    .await
    .into_response();
    let (status, json) = response_parts(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "deploying");

    let updated = registry.deployment(&deployment.id).await.unwrap().unwrap();
    assert_eq!(updated.status, DeploymentStatus::Deploying);
    assert_eq!(updated.artifact_key.as_deref(), Some("packages/docs/pkg-1"));
    assert_eq!(updated.build_time_seconds, Some(42.5));
}

#[tokio::test]
async fn test_redelivered_uploaded_is_acknowledged_noop() {
    let registry = Arc::new(MemoryRegistry::new());
    let state = state(registry.clone());
    let (_, deployment) = seed_deployment(&registry, DeploymentStatus::Deploying).await;

    let body = serde_json::json!({
        "deploymentId": deployment.id,
        "status": "uploaded",
        "artifactKey": "packages/docs/pkg-1",
    })
    .to_string();

    let response = build_callback_handler(
        State(state),
        signed_headers(body.as_bytes()),
        Bytes::from(body),
    )
    .await
    .into_response();
    let (status, json) = response_parts(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["accepted"], true);
    assert_eq!(json["noop"], true);

    let unchanged = registry.deployment(&deployment.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, DeploymentStatus::Deploying);
}

#[tokio::test]
async fn test_failed_callback_records_error() {
    let registry = Arc::new(MemoryRegistry::new());
    let state = state(registry.clone());
    let (_, deployment) = seed_deployment(&registry, DeploymentStatus::Building).await;

    let body = serde_json::json!({
        "deploymentId": deployment.id,
        "status": "failed",
        "errorMessage": "npm install exited with code 1",
        "buildLogs": "npm ERR! peer dep missing\n",
    })
    .to_string();

    let response = build_callback_handler(
        State(state),
        signed_headers(body.as_bytes()),
        Bytes::from(body),
    )
    .await
    .into_response();
    let (status, json) = response_parts(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "failed");

    let updated = registry.deployment(&deployment.id).await.unwrap().unwrap();
    assert_eq!(updated.status, DeploymentStatus::Failed);
    assert_eq!(
        updated.error_message.as_deref(),
        Some("npm install exited with code 1")
    );
    assert!(updated.build_log.contains("peer dep missing"));
}

#[tokio::test]
async fn test_env_endpoint_requires_path_signature() {
    let registry = Arc::new(MemoryRegistry::new());
    let state = state(registry.clone());

    let mut project = Project::new("api", ProjectType::BackendNode);
    project
        .env_vars
        .production
        .insert("DATABASE_URL".to_string(), "postgres://prod".to_string());
    project
        .env_vars
        .staging
        .insert("DATABASE_URL".to_string(), "postgres://stage".to_string());
    registry.insert_project(&project).await.unwrap();

    let deployment = Deployment::new(project.id.clone(), Revision::default(), false);
    registry.insert_deployment(&deployment).await.unwrap();

    // Signature over the wrong payload is refused.
    let response = env_vars_handler(
        State(state.clone()),
        Path(deployment.id.to_string()),
        signed_headers(b"not-the-path"),
    )
    .await
    .into_response();
    let (status, _) = response_parts(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Signature over the request path yields the production variables.
    let path = format!("/deployments/{}/env", deployment.id);
    let response = env_vars_handler(
        State(state),
        Path(deployment.id.to_string()),
        signed_headers(path.as_bytes()),
    )
    .await
    .into_response();
    let (status, json) = response_parts(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["environment"], "production");
    assert_eq!(json["envVars"]["DATABASE_URL"], "postgres://prod");
}
