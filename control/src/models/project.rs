//! Project models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::deployment::{DeploymentId, ProjectId};
use crate::models::Environment;

/// Closed set of deployable project types.
///
/// Finalize logic matches exhaustively on this, so adding a type is a
/// compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    Static,
    BackendPython,
    BackendNode,
}

impl ProjectType {
    pub fn is_backend(self) -> bool {
        match self {
            ProjectType::Static => false,
            ProjectType::BackendPython | ProjectType::BackendNode => true,
        }
    }
}

/// Build/runtime configuration for a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Command to install dependencies
    #[serde(default)]
    pub install_command: Option<String>,

    /// Command to build the artifact
    #[serde(default)]
    pub build_command: Option<String>,

    /// Output directory within the build workspace (static projects)
    #[serde(default)]
    pub output_dir: Option<String>,

    /// Command the function platform runs to start the service (backends)
    #[serde(default)]
    pub start_command: Option<String>,

    /// Serve index.html for unknown paths (single-page apps)
    #[serde(default)]
    pub spa_fallback: bool,
}

/// Per-environment declared environment variables.
///
/// Values are stored decrypted here; encryption at rest happens outside
/// this service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectEnvVars {
    #[serde(default)]
    pub production: BTreeMap<String, String>,

    #[serde(default)]
    pub staging: BTreeMap<String, String>,
}

impl ProjectEnvVars {
    pub fn for_environment(&self, environment: Environment) -> &BTreeMap<String, String> {
        match environment {
            Environment::Production => &self.production,
            Environment::Staging => &self.staging,
        }
    }
}

/// A deployable unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,

    /// Globally unique slug; hostnames and function names derive from it
    pub slug: String,

    pub project_type: ProjectType,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub env_vars: ProjectEnvVars,

    /// Production pointer: the live deployment, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_deployment_id: Option<DeploymentId>,

    /// Staging pointer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_deployment_id: Option<DeploymentId>,

    /// Function name from before the stable-naming scheme; deleted after
    /// the first successful publish to the stable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_function_name: Option<String>,

    /// Optional access-password hash embedded in staging routing records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_password_hash: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(slug: impl Into<String>, project_type: ProjectType) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::generate(),
            slug: slug.into(),
            project_type,
            build: BuildConfig::default(),
            env_vars: ProjectEnvVars::default(),
            active_deployment_id: None,
            staging_deployment_id: None,
            legacy_function_name: None,
            staging_password_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The environment pointer for `environment`
    pub fn pointer(&self, environment: Environment) -> Option<&DeploymentId> {
        match environment {
            Environment::Production => self.active_deployment_id.as_ref(),
            Environment::Staging => self.staging_deployment_id.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_serializes_kebab_case() {
        let s = serde_json::to_string(&ProjectType::BackendPython).unwrap();
        assert_eq!(s, "\"backend-python\"");
    }

    #[test]
    fn test_backend_detection() {
        assert!(!ProjectType::Static.is_backend());
        assert!(ProjectType::BackendNode.is_backend());
    }
}
