//! Custom-domain provisioning: ownership verification, edge-hostname
//! establishment and routing linkage

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::edge::dns::DnsProvider;
use crate::edge::hostnames::{ComplianceState, EdgeHostnames};
use crate::edge::routing::RoutingStore;
use crate::errors::ControlError;
use crate::models::domain::{CustomDomain, DomainStatus};
use crate::models::status::DeploymentStatus;
use crate::models::Environment;
use crate::registry::{DeploymentFilter, Registry};

use super::routing_record;

/// Result of a provisioning attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Fully provisioned and routable
    Online,

    /// Configured, but held offline pending an external regulatory
    /// filing; SSL issuance is deferred, not failed
    PendingCompliance { detail: String },

    /// Platform-owned subdomain: the edge hostname must be created
    /// through the provider console
    ManualStepRequired,
}

/// Verifies domain ownership and DNS configuration, establishes the edge
/// hostname in the correct order and links the domain to the active
/// deployment.
pub struct DomainProvisioner {
    registry: Arc<dyn Registry>,
    routing: Arc<dyn RoutingStore>,
    dns: Arc<dyn DnsProvider>,
    hostnames: Arc<dyn EdgeHostnames>,
    apex_domain: String,
    edge_cname_target: String,
}

impl DomainProvisioner {
    pub fn new(
        registry: Arc<dyn Registry>,
        routing: Arc<dyn RoutingStore>,
        dns: Arc<dyn DnsProvider>,
        hostnames: Arc<dyn EdgeHostnames>,
        apex_domain: impl Into<String>,
        edge_cname_target: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            routing,
            dns,
            hostnames,
            apex_domain: apex_domain.into(),
            edge_cname_target: edge_cname_target.into(),
        }
    }

    /// DNS name whose TXT record must carry the verification token
    fn verification_name(domain: &str) -> String {
        format!("_caravel.{}", domain)
    }

    fn is_platform_managed(&self, domain: &str) -> bool {
        domain == self.apex_domain || domain.ends_with(&format!(".{}", self.apex_domain))
    }

    /// Verify ownership and DNS configuration of `domain`.
    async fn verify(&self, domain: &CustomDomain) -> Result<(), ControlError> {
        let txt_name = Self::verification_name(&domain.domain);
        let values = self.dns.lookup_txt(&txt_name).await?;
        if !values.iter().any(|v| v == &domain.verification_token) {
            return Err(ControlError::PreconditionFailed(format!(
                "no TXT record at {} matches the verification token",
                txt_name
            )));
        }

        // Platform subdomains already resolve to the edge; external
        // hostnames must CNAME to it.
        if !self.is_platform_managed(&domain.domain) {
            match self.dns.lookup_cname(&domain.domain).await? {
                Some(target) if target == self.edge_cname_target => {}
                Some(target) => {
                    return Err(ControlError::PreconditionFailed(format!(
                        "{} points at {}, expected {}",
                        domain.domain, target, self.edge_cname_target
                    )));
                }
                None => {
                    return Err(ControlError::PreconditionFailed(format!(
                        "{} has no CNAME to {}",
                        domain.domain, self.edge_cname_target
                    )));
                }
            }
        }

        Ok(())
    }

    /// Provision `name`: verify, establish the edge hostname, link the
    /// domain to the project's latest production deployment and write the
    /// routing record.
    ///
    /// If the routing write fails after the edge hostname was created,
    /// the created resource is deleted before the error is returned.
    pub async fn provision(&self, name: &str) -> Result<ProvisionOutcome, ControlError> {
        let mut domain = self
            .registry
            .domain(name)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("domain {}", name)))?;

        let project = self
            .registry
            .project(&domain.project_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("project {}", domain.project_id)))?;

        self.verify(&domain).await?;
        info!(domain = %name, project = %project.slug, "domain verified");

        let (outcome, edge_hostname) = if self.is_platform_managed(name) {
            // Platform-owned subdomains need a manual console step for
            // the edge hostname; everything else still proceeds.
            (ProvisionOutcome::ManualStepRequired, None)
        } else {
            let resource = self.hostnames.create(name).await?;
            let outcome = match &resource.compliance {
                ComplianceState::Compliant => ProvisionOutcome::Online,
                ComplianceState::PendingFiling { detail } => {
                    warn!(domain = %name, detail = %detail, "edge hostname pending regulatory filing");
                    ProvisionOutcome::PendingCompliance {
                        detail: detail.clone(),
                    }
                }
            };
            (outcome, Some(resource))
        };

        // Link to the most recent success-terminal production deployment,
        // if the project has one, and mirror it into the routing store.
        let target = self
            .registry
            .list_deployments(
                &DeploymentFilter::new()
                    .with_project(project.id.clone())
                    .with_environment(Environment::Production)
                    .with_status(DeploymentStatus::Deployed)
                    .with_limit(1),
            )
            .await?
            .into_iter()
            .next();

        if let Some(target) = &target {
            // Same record shape as the platform hostname; reuse its
            // current record when present so backend endpoints carry the
            // function invocation URL.
            let platform = Environment::Production.hostname(&project.slug, &self.apex_domain);
            let record = match self.routing.get(&platform).await? {
                Some(record) => record,
                None => routing_record(&project, target, target.endpoint.as_deref())?,
            };
            if let Err(e) = self.routing.put(name, &record).await {
                // No orphaned managed resources on partial failure.
                if let Some(resource) = &edge_hostname {
                    if let Err(del) = self.hostnames.delete(&resource.id).await {
                        warn!(domain = %name, error = %del, "edge hostname rollback failed");
                    }
                }
                domain.routing_synced = false;
                domain.routing_synced_at = Some(Utc::now());
                self.registry.update_domain(&domain).await?;
                return Err(ControlError::PartialFailure(format!(
                    "routing write for {} failed: {}",
                    name, e
                )));
            }
            domain.active_deployment_id = Some(target.id.clone());
            domain.routing_synced = true;
            domain.routing_synced_at = Some(Utc::now());
        }

        domain.status = match &outcome {
            ProvisionOutcome::Online => DomainStatus::Online,
            ProvisionOutcome::PendingCompliance { detail } => {
                domain.offline_reason = Some(detail.clone());
                DomainStatus::PendingCompliance
            }
            ProvisionOutcome::ManualStepRequired => DomainStatus::ManualStepRequired,
        };
        domain.edge_hostname_id = edge_hostname.map(|r| r.id);
        self.registry.update_domain(&domain).await?;

        info!(domain = %name, outcome = ?outcome, "domain provisioned");
        Ok(outcome)
    }
}
