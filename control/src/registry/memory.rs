//! In-memory registry

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::errors::ControlError;
use crate::models::deployment::{Deployment, DeploymentId, ProjectId};
use crate::models::domain::CustomDomain;
use crate::models::project::Project;
use crate::models::status::DeploymentStatus;
use crate::models::Environment;

use super::{DeploymentFilter, Registry};

/// In-memory registry backing tests and single-node deployments.
/// Data does not survive a process restart.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    deployments: RwLock<HashMap<String, Deployment>>,
    projects: RwLock<HashMap<String, Project>>,
    domains: RwLock<HashMap<String, CustomDomain>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> ControlError {
    ControlError::RegistryError("lock poisoned".to_string())
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn insert_deployment(&self, deployment: &Deployment) -> Result<(), ControlError> {
        let mut deployments = self.deployments.write().map_err(|_| poisoned())?;
        let key = deployment.id.as_str().to_owned();
        if deployments.contains_key(&key) {
            return Err(ControlError::RegistryError(format!(
                "deployment {} already exists",
                key
            )));
        }
        deployments.insert(key, deployment.clone());
        Ok(())
    }

    async fn deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>, ControlError> {
        let deployments = self.deployments.read().map_err(|_| poisoned())?;
        Ok(deployments.get(id.as_str()).cloned())
    }

    async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<Deployment>, ControlError> {
        let deployments = self.deployments.read().map_err(|_| poisoned())?;

        let mut matches: Vec<Deployment> = deployments
            .values()
            .filter(|d| {
                filter
                    .project_id
                    .as_ref()
                    .is_none_or(|p| &d.project_id == p)
            })
            .filter(|d| {
                filter
                    .environment
                    .is_none_or(|e| d.environment() == e)
            })
            .filter(|d| filter.status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn transition_deployment(
        &self,
        id: &DeploymentId,
        to: DeploymentStatus,
        error: Option<&str>,
    ) -> Result<Deployment, ControlError> {
        let mut deployments = self.deployments.write().map_err(|_| poisoned())?;
        let deployment = deployments
            .get_mut(id.as_str())
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))?;

        if !deployment.status.can_transition_to(to) {
            return Err(ControlError::InvalidTransition {
                from: deployment.status.to_string(),
                label: to.to_string(),
            });
        }

        deployment.status = to;
        deployment.error_message = error.map(ToOwned::to_owned);
        deployment.updated_at = Utc::now();
        if to == DeploymentStatus::Deployed && deployment.published_at.is_none() {
            deployment.published_at = Some(deployment.updated_at);
        }

        Ok(deployment.clone())
    }

    async fn record_upload(
        &self,
        id: &DeploymentId,
        artifact_key: &str,
        build_time_seconds: Option<f64>,
    ) -> Result<(), ControlError> {
        let mut deployments = self.deployments.write().map_err(|_| poisoned())?;
        let deployment = deployments
            .get_mut(id.as_str())
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))?;

        deployment.artifact_key = Some(artifact_key.to_owned());
        if build_time_seconds.is_some() {
            deployment.build_time_seconds = build_time_seconds;
        }
        deployment.updated_at = Utc::now();
        Ok(())
    }

    async fn append_build_log(&self, id: &DeploymentId, text: &str) -> Result<(), ControlError> {
        let mut deployments = self.deployments.write().map_err(|_| poisoned())?;
        let deployment = deployments
            .get_mut(id.as_str())
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))?;

        deployment.append_log(text);
        deployment.updated_at = Utc::now();
        Ok(())
    }

    async fn set_endpoint(&self, id: &DeploymentId, endpoint: &str) -> Result<(), ControlError> {
        let mut deployments = self.deployments.write().map_err(|_| poisoned())?;
        let deployment = deployments
            .get_mut(id.as_str())
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))?;

        deployment.endpoint = Some(endpoint.to_owned());
        deployment.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_project(&self, project: &Project) -> Result<(), ControlError> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        if projects.values().any(|p| p.slug == project.slug) {
            return Err(ControlError::RegistryError(format!(
                "project slug {} already exists",
                project.slug
            )));
        }
        projects.insert(project.id.as_str().to_owned(), project.clone());
        Ok(())
    }

    async fn project(&self, id: &ProjectId) -> Result<Option<Project>, ControlError> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        Ok(projects.get(id.as_str()).cloned())
    }

    async fn project_by_slug(&self, slug: &str) -> Result<Option<Project>, ControlError> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        Ok(projects.values().find(|p| p.slug == slug).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ControlError> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        Ok(projects.values().cloned().collect())
    }

    async fn set_pointer(
        &self,
        project_id: &ProjectId,
        environment: Environment,
        deployment_id: &DeploymentId,
    ) -> Result<(), ControlError> {
        // Validate the target before taking the project lock
        let target = self
            .deployment(deployment_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", deployment_id)))?;

        if &target.project_id != project_id {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} does not belong to project {}",
                deployment_id, project_id
            )));
        }
        if !target.status.is_success_terminal() {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} is {}, not deployed",
                deployment_id, target.status
            )));
        }
        if target.environment() != environment {
            return Err(ControlError::PreconditionFailed(format!(
                "deployment {} targets {}, not {}",
                deployment_id,
                target.environment(),
                environment
            )));
        }

        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        let project = projects
            .get_mut(project_id.as_str())
            .ok_or_else(|| ControlError::NotFound(format!("project {}", project_id)))?;

        match environment {
            Environment::Production => project.active_deployment_id = Some(deployment_id.clone()),
            Environment::Staging => project.staging_deployment_id = Some(deployment_id.clone()),
        }
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_legacy_function_name(
        &self,
        project_id: &ProjectId,
    ) -> Result<(), ControlError> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        let project = projects
            .get_mut(project_id.as_str())
            .ok_or_else(|| ControlError::NotFound(format!("project {}", project_id)))?;

        project.legacy_function_name = None;
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_domain(&self, domain: &CustomDomain) -> Result<(), ControlError> {
        let mut domains = self.domains.write().map_err(|_| poisoned())?;
        if domains.contains_key(&domain.domain) {
            return Err(ControlError::RegistryError(format!(
                "domain {} already exists",
                domain.domain
            )));
        }
        domains.insert(domain.domain.clone(), domain.clone());
        Ok(())
    }

    async fn domain(&self, name: &str) -> Result<Option<CustomDomain>, ControlError> {
        let domains = self.domains.read().map_err(|_| poisoned())?;
        Ok(domains.get(name).cloned())
    }

    async fn domains_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<CustomDomain>, ControlError> {
        let domains = self.domains.read().map_err(|_| poisoned())?;
        Ok(domains
            .values()
            .filter(|d| &d.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn update_domain(&self, domain: &CustomDomain) -> Result<(), ControlError> {
        let mut domains = self.domains.write().map_err(|_| poisoned())?;
        let entry = domains
            .get_mut(&domain.domain)
            .ok_or_else(|| ControlError::NotFound(format!("domain {}", domain.domain)))?;

        *entry = domain.clone();
        entry.updated_at = Utc::now();
        Ok(())
    }
}
