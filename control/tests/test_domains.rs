//! Domain provisioner integration tests

use std::sync::Arc;

use caravel_control::edge::dns::{MemoryDnsProvider, RecordKind};
use caravel_control::edge::hostnames::MemoryEdgeHostnames;
use caravel_control::edge::routing::{MemoryRoutingStore, RoutingRecord};
use caravel_control::edge::CallLog;
use caravel_control::models::deployment::{Deployment, Revision};
use caravel_control::models::domain::{CustomDomain, DomainStatus};
use caravel_control::models::project::{Project, ProjectType};
use caravel_control::models::status::DeploymentStatus;
use caravel_control::publish::domains::{DomainProvisioner, ProvisionOutcome};
use caravel_control::registry::{MemoryRegistry, Registry};

struct Harness {
    registry: Arc<MemoryRegistry>,
    routing: Arc<MemoryRoutingStore>,
    dns: Arc<MemoryDnsProvider>,
    hostnames: Arc<MemoryEdgeHostnames>,
    provisioner: DomainProvisioner,
}

fn harness() -> Harness {
    let calls = CallLog::new();
    let registry = Arc::new(MemoryRegistry::new());
    let routing = Arc::new(MemoryRoutingStore::with_log(calls.clone()));
    let dns = Arc::new(MemoryDnsProvider::with_log(calls.clone()));
    let hostnames = Arc::new(MemoryEdgeHostnames::with_log(calls));
    let provisioner = DomainProvisioner::new(
        registry.clone(),
        routing.clone(),
        dns.clone(),
        hostnames.clone(),
        "caravel.app",
        "edge.caravel.app",
    );
    Harness {
        registry,
        routing,
        dns,
        hostnames,
        provisioner,
    }
}

/// Seed a project with one deployed production deployment and a domain
/// record. Returns the domain and the deployment.
async fn seed(h: &Harness, name: &str) -> (CustomDomain, Deployment) {
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();

    let mut deployment = Deployment::new(project.id.clone(), Revision::default(), false);
    deployment.status = DeploymentStatus::Deployed;
    deployment.published_at = Some(deployment.created_at);
    h.registry.insert_deployment(&deployment).await.unwrap();

    let domain = CustomDomain::new(name, project.id.clone());
    h.registry.insert_domain(&domain).await.unwrap();
    (domain, deployment)
}

fn seed_valid_dns(h: &Harness, domain: &CustomDomain) {
    h.dns.seed(
        &format!("_caravel.{}", domain.domain),
        RecordKind::Txt,
        &domain.verification_token,
    );
    h.dns
        .seed(&domain.domain, RecordKind::Cname, "edge.caravel.app");
}

#[tokio::test]
async fn test_provision_external_domain_goes_online() {
    let h = harness();
    let (domain, deployment) = seed(&h, "docs.example.com").await;
    seed_valid_dns(&h, &domain);

    let outcome = h.provisioner.provision("docs.example.com").await.unwrap();
    assert!(matches!(outcome, ProvisionOutcome::Online));

    let stored = h.registry.domain("docs.example.com").await.unwrap().unwrap();
    assert_eq!(stored.status, DomainStatus::Online);
    assert_eq!(stored.active_deployment_id, Some(deployment.id.clone()));
    assert!(stored.routing_synced);
    assert!(stored.edge_hostname_id.is_some());
    assert_eq!(h.hostnames.resource_count(), 1);

    assert_eq!(
        h.routing
            .record_for("docs.example.com")
            .unwrap()
            .deployment_id(),
        &deployment.id
    );
}

#[tokio::test]
async fn test_provision_reuses_platform_routing_record() {
    let h = harness();
    let (domain, deployment) = seed(&h, "docs.example.com").await;
    seed_valid_dns(&h, &domain);

    // The platform hostname already carries the live record; the custom
    // domain mirrors it instead of rebuilding one.
    let record = RoutingRecord::Backend {
        endpoint: "https://fn-docs.edge-fn.invoke".to_string(),
        deployment_id: deployment.id.clone(),
        revision: "abc123".to_string(),
        updated_at: chrono::Utc::now(),
    };
    use caravel_control::edge::routing::RoutingStore;
    h.routing.put("docs.caravel.app", &record).await.unwrap();

    h.provisioner.provision("docs.example.com").await.unwrap();

    match h.routing.record_for("docs.example.com").unwrap() {
        RoutingRecord::Backend { endpoint, .. } => {
            assert_eq!(endpoint, "https://fn-docs.edge-fn.invoke");
        }
        other => panic!("expected mirrored backend record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_provision_rejects_missing_txt_token() {
    let h = harness();
    let (domain, _) = seed(&h, "docs.example.com").await;
    h.dns
        .seed(&domain.domain, RecordKind::Cname, "edge.caravel.app");

    let err = h.provisioner.provision("docs.example.com").await.unwrap_err();
    assert_eq!(err.kind(), "precondition_failed");
    assert_eq!(h.hostnames.resource_count(), 0);

    let stored = h.registry.domain("docs.example.com").await.unwrap().unwrap();
    assert_eq!(stored.status, DomainStatus::Unverified);
}

#[tokio::test]
async fn test_provision_rejects_wrong_cname_target() {
    let h = harness();
    let (domain, _) = seed(&h, "docs.example.com").await;
    h.dns.seed(
        &format!("_caravel.{}", domain.domain),
        RecordKind::Txt,
        &domain.verification_token,
    );
    h.dns
        .seed(&domain.domain, RecordKind::Cname, "other-host.example.net");

    let err = h.provisioner.provision("docs.example.com").await.unwrap_err();
    assert_eq!(err.kind(), "precondition_failed");
}

#[tokio::test]
async fn test_platform_subdomain_requires_manual_step() {
    let h = harness();
    let (domain, _) = seed(&h, "blog.caravel.app").await;

    // Platform-managed names skip the CNAME check entirely.
    h.dns.seed(
        &format!("_caravel.{}", domain.domain),
        RecordKind::Txt,
        &domain.verification_token,
    );

    let outcome = h.provisioner.provision("blog.caravel.app").await.unwrap();
    assert!(matches!(outcome, ProvisionOutcome::ManualStepRequired));

    let stored = h.registry.domain("blog.caravel.app").await.unwrap().unwrap();
    assert_eq!(stored.status, DomainStatus::ManualStepRequired);
    assert!(stored.edge_hostname_id.is_none());
    assert_eq!(h.hostnames.resource_count(), 0);
}

#[tokio::test]
async fn test_pending_compliance_surfaces_detail() {
    let h = harness();
    let (domain, _) = seed(&h, "docs.example.com").await;
    seed_valid_dns(&h, &domain);
    h.hostnames
        .set_pending_filing(Some("regulatory filing in progress".to_string()));

    let outcome = h.provisioner.provision("docs.example.com").await.unwrap();
    match outcome {
        ProvisionOutcome::PendingCompliance { detail } => {
            assert_eq!(detail, "regulatory filing in progress");
        }
        other => panic!("expected pending compliance, got {:?}", other),
    }

    let stored = h.registry.domain("docs.example.com").await.unwrap().unwrap();
    assert_eq!(stored.status, DomainStatus::PendingCompliance);
    assert_eq!(
        stored.offline_reason.as_deref(),
        Some("regulatory filing in progress")
    );
}

#[tokio::test]
async fn test_routing_failure_rolls_back_edge_hostname() {
    let h = harness();
    let (domain, _) = seed(&h, "docs.example.com").await;
    seed_valid_dns(&h, &domain);
    h.routing.set_fail_puts(true);

    let err = h.provisioner.provision("docs.example.com").await.unwrap_err();
    assert_eq!(err.kind(), "partial_failure");

    // The created edge hostname was deleted again; no orphaned resource.
    assert_eq!(h.hostnames.resource_count(), 0);

    let stored = h.registry.domain("docs.example.com").await.unwrap().unwrap();
    assert!(!stored.routing_synced);
    assert!(stored.routing_synced_at.is_some());
}

#[tokio::test]
async fn test_provision_without_deployment_still_verifies() {
    let h = harness();
    let project = Project::new("docs", ProjectType::Static);
    h.registry.insert_project(&project).await.unwrap();
    let domain = CustomDomain::new("docs.example.com", project.id.clone());
    h.registry.insert_domain(&domain).await.unwrap();
    seed_valid_dns(&h, &domain);

    let outcome = h.provisioner.provision("docs.example.com").await.unwrap();
    assert!(matches!(outcome, ProvisionOutcome::Online));

    // Nothing to serve yet: no routing record and no linked deployment.
    let stored = h.registry.domain("docs.example.com").await.unwrap().unwrap();
    assert!(stored.active_deployment_id.is_none());
    assert!(h.routing.record_for("docs.example.com").is_none());
}
