//! Rollback engine: re-publishes an older success-terminal deployment
//! from its stored artifact

use std::sync::Arc;

use tracing::info;

use crate::errors::ControlError;
use crate::models::deployment::{Deployment, DeploymentId, ProjectId};
use crate::models::Environment;
use crate::registry::{DeploymentFilter, Registry};

use super::finalizer::Finalizer;
use super::LogSink;

/// Re-runs the finalize-equivalent publish against an older deployment.
pub struct RollbackEngine {
    registry: Arc<dyn Registry>,
    finalizer: Arc<Finalizer>,
}

impl RollbackEngine {
    pub fn new(registry: Arc<dyn Registry>, finalizer: Arc<Finalizer>) -> Self {
        Self {
            registry,
            finalizer,
        }
    }

    /// Check every rollback precondition without publishing. Returns the
    /// eligible target deployment.
    async fn check_preconditions(
        &self,
        project_id: &ProjectId,
        target_id: &DeploymentId,
        environment: Environment,
    ) -> Result<Deployment, ControlError> {
        let target = self
            .registry
            .deployment(target_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", target_id)))?;

        if &target.project_id != project_id {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} does not belong to project {}",
                target_id, project_id
            )));
        }
        if target.environment() != environment {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} targets {}, not {}",
                target_id,
                target.environment(),
                environment
            )));
        }
        if !target.status.is_success_terminal() {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} is {}; only deployed deployments can be rolled back to",
                target_id, target.status
            )));
        }

        let project = self
            .registry
            .project(project_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("project {}", project_id)))?;

        if project.pointer(environment) == Some(target_id) {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} is already active for {}",
                target_id, environment
            )));
        }

        // An in-flight publish for the same project/environment would
        // race with the rollback; refuse until it reaches a terminal
        // state.
        let in_flight = self
            .registry
            .list_deployments(
                &DeploymentFilter::new()
                    .with_project(project_id.clone())
                    .with_environment(environment),
            )
            .await?
            .into_iter()
            .find(|d| !d.status.is_terminal());

        if let Some(d) = in_flight {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} is {}; wait for it to finish before rolling back",
                d.id, d.status
            )));
        }

        Ok(target)
    }

    /// Roll the environment back to `target_id`.
    ///
    /// The target's record is reused: `published_at` and `created_at`
    /// stay as they were, so garbage-collection ordering is unaffected.
    pub async fn rollback(
        &self,
        project_id: &ProjectId,
        target_id: &DeploymentId,
        environment: Environment,
        log: &dyn LogSink,
    ) -> Result<(), ControlError> {
        let target = self
            .check_preconditions(project_id, target_id, environment)
            .await?;

        let project = self
            .registry
            .project(project_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("project {}", project_id)))?;

        info!(
            project = %project.slug,
            deployment_id = %target_id,
            environment = %environment,
            "rolling back"
        );
        log.append(&format!(
            "Rolling back {} to deployment {}",
            environment, target_id
        ));

        let outcome = self.finalizer.republish(&project, &target, log).await?;
        log.append(&format!("Rollback complete: {}", outcome.endpoint));
        Ok(())
    }
}
