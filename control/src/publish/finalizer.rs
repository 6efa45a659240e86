//! Deploy finalizer: publishes an uploaded artifact to production or
//! staging and advances the registry to a terminal state

use std::sync::Arc;

use tracing::{error, info};

use crate::edge::dns::{DnsProvider, RecordKind};
use crate::edge::functions::{FunctionConfig, FunctionPlatform};
use crate::edge::routing::RoutingStore;
use crate::errors::ControlError;
use crate::models::deployment::{Deployment, DeploymentId};
use crate::models::project::{Project, ProjectType};
use crate::models::status::DeploymentStatus;
use crate::models::Environment;
use crate::registry::Registry;

use super::gc::GarbageCollector;
use super::{
    best_effort, default_start_command, platform_hostname, routing_record, LogSink,
};

/// Result of publishing one deployment's routing and compute state
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// Platform hostname the deployment is served from
    pub hostname: String,

    /// Public URL recorded on the deployment
    pub endpoint: String,

    /// Function invocation URL for backend deployments; custom-domain
    /// routing records point here
    pub invoke_endpoint: Option<String>,
}

/// Publishes deployments whose artifact upload is confirmed complete.
///
/// External calls fall in two explicit categories: required steps run in
/// order and abort the publish on failure; best-effort steps (cache
/// purge, auto-update domain sync, opportunistic GC) are logged per item
/// and never fail the deployment.
pub struct Finalizer {
    registry: Arc<dyn Registry>,
    routing: Arc<dyn RoutingStore>,
    functions: Arc<dyn FunctionPlatform>,
    dns: Arc<dyn DnsProvider>,
    gc: Arc<GarbageCollector>,
    apex_domain: String,
    account_dns_endpoint: String,
}

impl Finalizer {
    pub fn new(
        registry: Arc<dyn Registry>,
        routing: Arc<dyn RoutingStore>,
        functions: Arc<dyn FunctionPlatform>,
        dns: Arc<dyn DnsProvider>,
        gc: Arc<GarbageCollector>,
        apex_domain: impl Into<String>,
        account_dns_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            routing,
            functions,
            dns,
            gc,
            apex_domain: apex_domain.into(),
            account_dns_endpoint: account_dns_endpoint.into(),
        }
    }

    /// Finalize a deployment in the `deploying` state.
    ///
    /// On success the deployment ends `deployed` with `published_at` set
    /// and the project pointer advanced. Any required-step failure marks
    /// it `failed` with the recorded error and leaves the pointer
    /// untouched.
    pub async fn finalize(
        &self,
        id: &DeploymentId,
        log: &dyn LogSink,
    ) -> Result<(), ControlError> {
        let deployment = self
            .registry
            .deployment(id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))?;

        if deployment.status != DeploymentStatus::Deploying {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} is {}, not deploying",
                id, deployment.status
            )));
        }

        let project = self
            .registry
            .project(&deployment.project_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("project {}", deployment.project_id)))?;

        info!(
            deployment_id = %id,
            project = %project.slug,
            environment = %deployment.environment(),
            "finalizing deployment"
        );
        log.append(&format!("Publishing to {}...", deployment.environment()));

        match self.publish(&project, &deployment, log).await {
            Ok(outcome) => {
                self.registry.set_endpoint(id, &outcome.endpoint).await?;
                self.registry
                    .transition_deployment(id, DeploymentStatus::Deployed, None)
                    .await?;

                // The deployment is already success-terminal here; a
                // pointer failure leaves it live but not active, which
                // operators need to see.
                if let Err(e) = self.complete(&project, &deployment, &outcome, log).await {
                    error!(
                        deployment_id = %id,
                        error = %e,
                        "deployment published but the pointer was not advanced"
                    );
                    log.append(&format!(
                        "warning: deployment is live but the pointer update failed: {}",
                        e
                    ));
                    return Err(e);
                }

                log.append(&format!("Deployed: {}", outcome.endpoint));
                info!(deployment_id = %id, endpoint = %outcome.endpoint, "deployment finalized");
                Ok(())
            }
            Err(e) => {
                error!(deployment_id = %id, error = %e, "finalize failed");
                log.append(&format!("Publish failed: {}", e));
                self.registry
                    .transition_deployment(id, DeploymentStatus::Failed, Some(&e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    /// Publish an already success-terminal deployment again, from its
    /// stored artifact. Used by rollback; status and `published_at` are
    /// left alone.
    pub async fn republish(
        &self,
        project: &Project,
        deployment: &Deployment,
        log: &dyn LogSink,
    ) -> Result<PublishOutcome, ControlError> {
        let outcome = self.publish(project, deployment, log).await?;
        self.registry
            .set_endpoint(&deployment.id, &outcome.endpoint)
            .await?;
        self.complete(project, deployment, &outcome, log).await?;
        Ok(outcome)
    }

    /// Required publish steps, ordered. Must not mutate the project
    /// pointer; that happens only in `complete`.
    async fn publish(
        &self,
        project: &Project,
        deployment: &Deployment,
        log: &dyn LogSink,
    ) -> Result<PublishOutcome, ControlError> {
        let environment = deployment.environment();
        let hostname = platform_hostname(project, environment, &self.apex_domain);

        match project.project_type {
            ProjectType::Static => {
                let record = routing_record(project, deployment, None)?;
                self.routing.put(&hostname, &record).await?;
                log.append(&format!("Routing record written for {}", hostname));

                Ok(PublishOutcome {
                    endpoint: format!("https://{}", hostname),
                    hostname,
                    invoke_endpoint: None,
                })
            }
            ProjectType::BackendPython | ProjectType::BackendNode => {
                self.publish_backend(project, deployment, environment, hostname, log)
                    .await
            }
        }
    }

    async fn publish_backend(
        &self,
        project: &Project,
        deployment: &Deployment,
        environment: Environment,
        hostname: String,
        log: &dyn LogSink,
    ) -> Result<PublishOutcome, ControlError> {
        let package_key = deployment.artifact_key.as_deref().ok_or_else(|| {
            ControlError::PreconditionFailed(format!(
                "deployment {} has no uploaded package",
                deployment.id
            ))
        })?;

        // Stable name: the function is an in-place update target, not a
        // fresh resource per deployment.
        let function_name = environment.function_name(&project.slug);

        // Merge declared env vars over the function's existing ones so an
        // update never silently drops variables set out of band.
        let mut env_vars = match self.functions.describe(&function_name).await? {
            Some(existing) => existing.env_vars,
            None => Default::default(),
        };
        for (key, value) in project.env_vars.for_environment(environment) {
            env_vars.insert(key.clone(), value.clone());
        }

        let start_command = project
            .build
            .start_command
            .clone()
            .unwrap_or_else(|| default_start_command(project.project_type).to_string());

        let config = FunctionConfig {
            package_key: package_key.to_string(),
            start_command,
            env_vars,
        };
        self.functions
            .create_or_update(&function_name, &config)
            .await?;
        log.append(&format!("Function {} updated", function_name));

        let invoke_url = self
            .functions
            .ensure_http_entry_point(&function_name)
            .await?;

        // The binding step validates that DNS already resolves to the
        // platform's account-level endpoint, so the record goes first.
        self.dns
            .create_record(&hostname, RecordKind::Cname, &self.account_dns_endpoint)
            .await?;
        self.functions
            .create_or_update_custom_domain(&hostname, &function_name)
            .await?;
        log.append(&format!("Hostname {} bound to {}", hostname, function_name));

        let record = routing_record(project, deployment, Some(&invoke_url))?;
        self.routing.put(&hostname, &record).await?;
        log.append(&format!("Routing record written for {}", hostname));

        // A function named before the stable-naming scheme is removed
        // only now that the new one is confirmed live.
        if let Some(legacy) = project
            .legacy_function_name
            .as_deref()
            .filter(|l| *l != function_name)
        {
            match self.functions.delete(legacy).await {
                Ok(()) => {
                    self.registry
                        .clear_legacy_function_name(&project.id)
                        .await?;
                    log.append(&format!("Legacy function {} deleted", legacy));
                }
                Err(e) => {
                    // Retried on the next publish; the stale function is
                    // unreachable either way.
                    log.append(&format!("warning: legacy function cleanup failed: {}", e));
                }
            }
        }

        Ok(PublishOutcome {
            endpoint: format!("https://{}", hostname),
            hostname,
            invoke_endpoint: Some(invoke_url),
        })
    }

    /// Pointer advance plus the best-effort tail. The deployment must be
    /// success-terminal by the time this runs.
    async fn complete(
        &self,
        project: &Project,
        deployment: &Deployment,
        outcome: &PublishOutcome,
        log: &dyn LogSink,
    ) -> Result<(), ControlError> {
        let environment = deployment.environment();
        self.registry
            .set_pointer(&project.id, environment, &deployment.id)
            .await?;

        let mut hostnames = vec![outcome.hostname.clone()];
        if environment == Environment::Production {
            let synced = self
                .sync_auto_update_domains(
                    project,
                    deployment,
                    outcome.invoke_endpoint.as_deref(),
                    log,
                )
                .await;
            hostnames.extend(synced);
        }

        best_effort(
            log,
            "cache purge",
            self.routing.purge_cache(&hostnames),
        )
        .await;

        best_effort(log, "garbage collection", async {
            self.gc.collect_project(project).await.map(|_| ())
        })
        .await;

        Ok(())
    }

    /// Advance every auto-update custom domain to the new deployment.
    /// Per-domain failures are recorded as `routing_synced = false` and
    /// never abort the publish. Returns the hostnames that synced.
    async fn sync_auto_update_domains(
        &self,
        project: &Project,
        deployment: &Deployment,
        invoke_endpoint: Option<&str>,
        log: &dyn LogSink,
    ) -> Vec<String> {
        let domains = match self.registry.domains_for_project(&project.id).await {
            Ok(domains) => domains,
            Err(e) => {
                log.append(&format!("warning: domain lookup failed: {}", e));
                return Vec::new();
            }
        };

        let mut synced = Vec::new();
        for mut domain in domains {
            if !domain.auto_update_enabled || !domain.is_verified() {
                continue;
            }

            let record = match routing_record(project, deployment, invoke_endpoint) {
                Ok(record) => record,
                Err(e) => {
                    log.append(&format!(
                        "warning: record build for {} failed: {}",
                        domain.domain, e
                    ));
                    continue;
                }
            };

            let result = self.routing.put(&domain.domain, &record).await;
            domain.routing_synced = result.is_ok();
            domain.routing_synced_at = Some(chrono::Utc::now());
            if result.is_ok() {
                domain.active_deployment_id = Some(deployment.id.clone());
                synced.push(domain.domain.clone());
                log.append(&format!("Custom domain {} updated", domain.domain));
            } else if let Err(e) = result {
                log.append(&format!(
                    "warning: routing write for {} failed: {}",
                    domain.domain, e
                ));
            }

            if let Err(e) = self.registry.update_domain(&domain).await {
                log.append(&format!(
                    "warning: domain record update for {} failed: {}",
                    domain.domain, e
                ));
            }
        }
        synced
    }
}
