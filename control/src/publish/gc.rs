//! Garbage collection of superseded deployment artifacts

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::edge::artifacts::ArtifactStore;
use crate::errors::ControlError;
use crate::models::deployment::DeploymentId;
use crate::models::project::Project;
use crate::models::status::DeploymentStatus;
use crate::models::Environment;
use crate::registry::{DeploymentFilter, Registry};

use super::artifact_prefix;

/// Reclaims artifact storage for success-terminal deployments that are
/// neither recent nor referenced by any pointer.
pub struct GarbageCollector {
    registry: Arc<dyn Registry>,
    artifacts: Arc<dyn ArtifactStore>,

    /// Deployments kept per project/environment beyond the protected set
    keep_count: usize,
}

impl GarbageCollector {
    pub fn new(
        registry: Arc<dyn Registry>,
        artifacts: Arc<dyn ArtifactStore>,
        keep_count: usize,
    ) -> Self {
        Self {
            registry,
            artifacts,
            keep_count,
        }
    }

    /// The set of deployment ids a collection pass must never purge:
    /// the project's pointer for the environment plus every custom
    /// domain's active deployment, regardless of recency.
    ///
    /// Pointers are read from the registry here, not from the caller's
    /// snapshot: a publish or rollback may have advanced them after the
    /// caller loaded its copy.
    async fn protected_set(
        &self,
        project: &Project,
        environment: Environment,
    ) -> Result<HashSet<DeploymentId>, ControlError> {
        let mut protected = HashSet::new();

        let current = self
            .registry
            .project(&project.id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("project {}", project.id)))?;
        if let Some(pointer) = current.pointer(environment) {
            protected.insert(pointer.clone());
        }

        // Domain pointers are collected across environments; strictly
        // wider than required, never narrower.
        for domain in self.registry.domains_for_project(&project.id).await? {
            if let Some(id) = domain.active_deployment_id {
                protected.insert(id);
            }
        }

        Ok(protected)
    }

    /// Collect one project/environment pair. Per-item storage failures
    /// are logged and skipped; they never abort the batch and the item
    /// is not marked purged.
    pub async fn collect(
        &self,
        project: &Project,
        environment: Environment,
    ) -> Result<usize, ControlError> {
        let deployed = self
            .registry
            .list_deployments(
                &DeploymentFilter::new()
                    .with_project(project.id.clone())
                    .with_environment(environment)
                    .with_status(DeploymentStatus::Deployed),
            )
            .await?;

        if deployed.len() <= self.keep_count {
            return Ok(0);
        }

        let protected = self.protected_set(project, environment).await?;

        // list_deployments returns newest first; everything past the
        // keep window is a candidate.
        let mut purged = 0;
        for deployment in deployed.iter().skip(self.keep_count) {
            if protected.contains(&deployment.id) {
                debug!(
                    deployment_id = %deployment.id,
                    "skipping protected deployment"
                );
                continue;
            }

            let prefix = artifact_prefix(project, deployment);
            if let Err(e) = self.artifacts.delete_prefix(&prefix).await {
                warn!(
                    deployment_id = %deployment.id,
                    error = %e,
                    "artifact deletion failed, skipping"
                );
                continue;
            }

            self.registry
                .transition_deployment(&deployment.id, DeploymentStatus::Purged, None)
                .await?;
            purged += 1;
        }

        if purged > 0 {
            info!(
                project = %project.slug,
                environment = %environment,
                purged,
                "garbage collection purged deployments"
            );
        }
        Ok(purged)
    }

    /// Collect both environments of a project
    pub async fn collect_project(&self, project: &Project) -> Result<usize, ControlError> {
        let mut purged = 0;
        purged += self.collect(project, Environment::Production).await?;
        purged += self.collect(project, Environment::Staging).await?;
        Ok(purged)
    }

    /// Full sweep across every project; used by the periodic worker
    pub async fn sweep(&self) -> Result<usize, ControlError> {
        let mut purged = 0;
        for project in self.registry.list_projects().await? {
            match self.collect_project(&project).await {
                Ok(n) => purged += n,
                Err(e) => warn!(project = %project.slug, error = %e, "GC pass failed"),
            }
        }
        Ok(purged)
    }
}
