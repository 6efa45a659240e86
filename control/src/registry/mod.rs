//! Deployment registry: the persisted state machine.
//!
//! All cross-entity references are ids resolved through this trait; the
//! registry is the only place deployment status and project/domain
//! pointers are mutated. An in-memory implementation backs tests and
//! single-node deployments.

mod memory;

pub use memory::MemoryRegistry;

use async_trait::async_trait;

use crate::errors::ControlError;
use crate::models::deployment::{Deployment, DeploymentId, ProjectId};
use crate::models::domain::CustomDomain;
use crate::models::project::Project;
use crate::models::status::DeploymentStatus;
use crate::models::Environment;

/// Filter criteria for listing deployments
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub project_id: Option<ProjectId>,
    pub environment: Option<Environment>,
    pub status: Option<DeploymentStatus>,
    pub limit: Option<usize>,
}

impl DeploymentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_status(mut self, status: DeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Persistence backend for deployments, projects and custom domains
#[async_trait]
pub trait Registry: Send + Sync {
    // ---- deployments ----

    /// Insert a new deployment record; rejects duplicate ids
    async fn insert_deployment(&self, deployment: &Deployment) -> Result<(), ControlError>;

    async fn deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>, ControlError>;

    /// List deployments matching the filter, newest first by creation time
    async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<Deployment>, ControlError>;

    /// Move a deployment to `to`, enforcing the transition graph.
    ///
    /// Sets `published_at` the first time the deployment reaches
    /// `deployed` and records `error` on failure transitions. Returns the
    /// updated record.
    async fn transition_deployment(
        &self,
        id: &DeploymentId,
        to: DeploymentStatus,
        error: Option<&str>,
    ) -> Result<Deployment, ControlError>;

    /// Record the uploaded artifact key and reported build time
    async fn record_upload(
        &self,
        id: &DeploymentId,
        artifact_key: &str,
        build_time_seconds: Option<f64>,
    ) -> Result<(), ControlError>;

    /// Append build log text (additive; safe under callback redelivery)
    async fn append_build_log(&self, id: &DeploymentId, text: &str) -> Result<(), ControlError>;

    /// Record the published endpoint for a deployment
    async fn set_endpoint(&self, id: &DeploymentId, endpoint: &str) -> Result<(), ControlError>;

    // ---- projects ----

    async fn insert_project(&self, project: &Project) -> Result<(), ControlError>;

    async fn project(&self, id: &ProjectId) -> Result<Option<Project>, ControlError>;

    async fn project_by_slug(&self, slug: &str) -> Result<Option<Project>, ControlError>;

    /// All projects; the GC sweep iterates over this
    async fn list_projects(&self) -> Result<Vec<Project>, ControlError>;

    /// Advance a project's environment pointer.
    ///
    /// The target must belong to the project, be success-terminal and
    /// match the environment's staging flag.
    async fn set_pointer(
        &self,
        project_id: &ProjectId,
        environment: Environment,
        deployment_id: &DeploymentId,
    ) -> Result<(), ControlError>;

    /// Clear the pre-stable-naming function name after migration
    async fn clear_legacy_function_name(&self, project_id: &ProjectId)
        -> Result<(), ControlError>;

    // ---- custom domains ----

    async fn insert_domain(&self, domain: &CustomDomain) -> Result<(), ControlError>;

    async fn domain(&self, name: &str) -> Result<Option<CustomDomain>, ControlError>;

    async fn domains_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<CustomDomain>, ControlError>;

    /// Persist an updated domain record (keyed by domain name)
    async fn update_domain(&self, domain: &CustomDomain) -> Result<(), ControlError>;
}
