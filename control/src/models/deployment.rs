//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::status::DeploymentStatus;
use crate::models::Environment;

/// Unique identifier for a deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeploymentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source revision metadata captured at trigger time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Revision {
    pub commit_id: String,
    pub message: String,
    pub author: String,
    pub branch: String,
}

/// One build + publish attempt for a project.
///
/// Deployments are never deleted; garbage collection only marks them
/// `purged` once their artifact storage is reclaimed. Cross-entity
/// references are ids resolved through the registry, never object graphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: DeploymentId,

    /// Owning project
    pub project_id: ProjectId,

    /// Source revision this deployment was built from
    pub revision: Revision,

    /// Current lifecycle status
    pub status: DeploymentStatus,

    /// Whether this deployment targets the staging environment
    pub is_staging: bool,

    /// Storage path (static) or function-package key (backend), set by the
    /// upload callback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_key: Option<String>,

    /// Published endpoint/URL once live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Accumulated build log text
    #[serde(default)]
    pub build_log: String,

    /// Error message for failed deployments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Build duration as reported by the build system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_time_seconds: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set exactly when the deployment first reaches `deployed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Create a new queued deployment
    pub fn new(project_id: ProjectId, revision: Revision, is_staging: bool) -> Self {
        let now = Utc::now();
        Self {
            id: DeploymentId::generate(),
            project_id,
            revision,
            status: DeploymentStatus::Queued,
            is_staging,
            artifact_key: None,
            endpoint: None,
            build_log: String::new(),
            error_message: None,
            build_time_seconds: None,
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }

    pub fn environment(&self) -> Environment {
        Environment::from_staging_flag(self.is_staging)
    }

    /// Append build log lines (additive, safe under callback redelivery)
    pub fn append_log(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.build_log.push_str(text);
        if !text.ends_with('\n') {
            self.build_log.push('\n');
        }
    }
}
