//! Rollback engine integration tests

use std::sync::Arc;

use chrono::{Duration, Utc};

use caravel_control::edge::artifacts::MemoryArtifactStore;
use caravel_control::edge::dns::MemoryDnsProvider;
use caravel_control::edge::functions::MemoryFunctionPlatform;
use caravel_control::edge::routing::MemoryRoutingStore;
use caravel_control::edge::CallLog;
use caravel_control::models::deployment::{Deployment, Revision};
use caravel_control::models::project::{Project, ProjectType};
use caravel_control::models::status::DeploymentStatus;
use caravel_control::models::Environment;
use caravel_control::publish::{BufferSink, Finalizer, GarbageCollector, RollbackEngine};
use caravel_control::registry::{MemoryRegistry, Registry};

struct Harness {
    registry: Arc<MemoryRegistry>,
    routing: Arc<MemoryRoutingStore>,
    artifacts: Arc<MemoryArtifactStore>,
    rollback: RollbackEngine,
}

fn harness() -> Harness {
    let calls = CallLog::new();
    let registry = Arc::new(MemoryRegistry::new());
    let routing = Arc::new(MemoryRoutingStore::with_log(calls.clone()));
    let artifacts = Arc::new(MemoryArtifactStore::with_log(calls.clone()));
    let gc = Arc::new(GarbageCollector::new(registry.clone(), artifacts.clone(), 3));
    let finalizer = Arc::new(Finalizer::new(
        registry.clone(),
        routing.clone(),
        Arc::new(MemoryFunctionPlatform::with_log(calls.clone())),
        Arc::new(MemoryDnsProvider::with_log(calls)),
        gc,
        "caravel.app",
        "ingress.caravel.app",
    ));
    let rollback = RollbackEngine::new(registry.clone(), finalizer);
    Harness {
        registry,
        routing,
        artifacts,
        rollback,
    }
}

async fn insert_deployed(
    registry: &MemoryRegistry,
    project: &Project,
    is_staging: bool,
    age_hours: i64,
) -> Deployment {
    let mut d = Deployment::new(project.id.clone(), Revision::default(), is_staging);
    d.status = DeploymentStatus::Deployed;
    d.created_at = Utc::now() - Duration::hours(age_hours);
    d.published_at = Some(d.created_at);
    registry.insert_deployment(&d).await.unwrap();
    d
}

#[tokio::test]
async fn test_rollback_republishes_target_and_moves_pointer() {
    let h = harness();
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();

    let old = insert_deployed(&h.registry, &project, false, 2).await;
    let current = insert_deployed(&h.registry, &project, false, 1).await;
    h.registry
        .set_pointer(&project.id, Environment::Production, &current.id)
        .await
        .unwrap();

    h.rollback
        .rollback(&project.id, &old.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap();

    let project = h.registry.project(&project.id).await.unwrap().unwrap();
    assert_eq!(project.active_deployment_id, Some(old.id.clone()));
    assert_eq!(
        h.routing
            .record_for("docs.caravel.app")
            .unwrap()
            .deployment_id(),
        &old.id
    );

    // The record is reused: timestamps stay, so GC ordering is unchanged.
    let target = h.registry.deployment(&old.id).await.unwrap().unwrap();
    assert_eq!(target.created_at, old.created_at);
    assert_eq!(target.published_at, old.published_at);
    assert_eq!(target.status, DeploymentStatus::Deployed);
}

#[tokio::test]
async fn test_rollback_target_survives_opportunistic_gc() {
    let h = harness();
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();

    // Five releases with keep-count 3; the rollback target is the oldest,
    // well outside the keep window.
    let mut deployments = Vec::new();
    for age in (1..=5).rev() {
        deployments.push(insert_deployed(&h.registry, &project, false, age).await);
    }
    let oldest = deployments.first().unwrap().clone();
    let newest = deployments.last().unwrap().clone();
    h.registry
        .set_pointer(&project.id, Environment::Production, &newest.id)
        .await
        .unwrap();

    h.rollback
        .rollback(&project.id, &oldest.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap();

    // The GC pass that follows the publish must see the moved pointer:
    // the freshly activated target stays deployed and its artifact stays
    // in storage.
    let target = h.registry.deployment(&oldest.id).await.unwrap().unwrap();
    assert_eq!(target.status, DeploymentStatus::Deployed);
    assert!(!h
        .artifacts
        .deleted_prefixes()
        .contains(&format!("sites/docs/{}", oldest.id)));

    let project = h.registry.project(&project.id).await.unwrap().unwrap();
    assert_eq!(project.active_deployment_id, Some(oldest.id.clone()));

    // The second-oldest release is unprotected and does get collected.
    let second = h.registry.deployment(&deployments[1].id).await.unwrap().unwrap();
    assert_eq!(second.status, DeploymentStatus::Purged);
}

#[tokio::test]
async fn test_rollback_rejects_unknown_target() {
    let h = harness();
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();

    let orphan = Deployment::new(project.id.clone(), Revision::default(), false);
    let err = h
        .rollback
        .rollback(&project.id, &orphan.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_rollback_rejects_foreign_deployment() {
    let h = harness();
    let ours = Project::new("docs", ProjectType::Static);
    let theirs = Project::new("blog", ProjectType::Static);
    h.registry.insert_project(&ours).await.unwrap();
    h.registry.insert_project(&theirs).await.unwrap();

    let foreign = insert_deployed(&h.registry, &theirs, false, 1).await;
    let err = h
        .rollback
        .rollback(&ours.id, &foreign.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "precondition_failed");
}

#[tokio::test]
async fn test_rollback_rejects_environment_mismatch() {
    let h = harness();
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();

    let staging = insert_deployed(&h.registry, &project, true, 1).await;
    let err = h
        .rollback
        .rollback(&project.id, &staging.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "precondition_failed");
}

#[tokio::test]
async fn test_rollback_rejects_non_deployed_target() {
    let h = harness();
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();

    let mut failed = Deployment::new(project.id.clone(), Revision::default(), false);
    failed.status = DeploymentStatus::Failed;
    h.registry.insert_deployment(&failed).await.unwrap();

    let err = h
        .rollback
        .rollback(&project.id, &failed.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "precondition_failed");
}

#[tokio::test]
async fn test_rollback_rejects_already_active_target() {
    let h = harness();
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();

    let current = insert_deployed(&h.registry, &project, false, 1).await;
    h.registry
        .set_pointer(&project.id, Environment::Production, &current.id)
        .await
        .unwrap();

    let err = h
        .rollback
        .rollback(&project.id, &current.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "precondition_failed");
}

#[tokio::test]
async fn test_rollback_rejects_while_publish_in_flight() {
    let h = harness();
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();

    let old = insert_deployed(&h.registry, &project, false, 2).await;
    let current = insert_deployed(&h.registry, &project, false, 1).await;
    h.registry
        .set_pointer(&project.id, Environment::Production, &current.id)
        .await
        .unwrap();

    let mut in_flight = Deployment::new(project.id.clone(), Revision::default(), false);
    in_flight.status = DeploymentStatus::Building;
    h.registry.insert_deployment(&in_flight).await.unwrap();

    let err = h
        .rollback
        .rollback(&project.id, &old.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "precondition_failed");

    // A staging build does not block a production rollback.
    let mut staging_build = Deployment::new(project.id.clone(), Revision::default(), true);
    staging_build.status = DeploymentStatus::Building;
    h.registry.insert_deployment(&staging_build).await.unwrap();
    h.registry
        .transition_deployment(&in_flight.id, DeploymentStatus::Cancelled, None)
        .await
        .unwrap();

    h.rollback
        .rollback(&project.id, &old.id, Environment::Production, &BufferSink::new())
        .await
        .unwrap();
}
