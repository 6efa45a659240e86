//! Custom domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::deployment::{DeploymentId, ProjectId};

/// Provisioning status of a custom domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    /// Ownership not yet proven
    Unverified,

    /// Verified; edge hostname must be created through the provider
    /// console for platform-owned subdomains
    ManualStepRequired,

    /// Verified and configured but held offline by a missing regulatory
    /// filing; SSL issuance deferred, not failed
    PendingCompliance,

    /// Fully provisioned and routable
    Online,
}

/// An external hostname bound to a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomDomain {
    /// Globally unique domain name
    pub domain: String,

    pub project_id: ProjectId,

    /// TXT record value proving ownership
    pub verification_token: String,

    pub status: DomainStatus,

    /// Deployment this domain currently serves. Independent of the
    /// project's own pointer so domains can pin older releases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_deployment_id: Option<DeploymentId>,

    /// Advance automatically when the project's production pointer does
    #[serde(default)]
    pub auto_update_enabled: bool,

    /// Whether the edge routing store reflects this record
    #[serde(default)]
    pub routing_synced: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_synced_at: Option<DateTime<Utc>>,

    /// Handle of the edge-hostname resource, once provisioned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_hostname_id: Option<String>,

    /// Why the domain is not online, when it is not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomDomain {
    pub fn new(domain: impl Into<String>, project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            domain: domain.into(),
            project_id,
            verification_token: format!("caravel-verify-{}", uuid::Uuid::new_v4()),
            status: DomainStatus::Unverified,
            active_deployment_id: None,
            auto_update_enabled: true,
            routing_synced: false,
            routing_synced_at: None,
            edge_hostname_id: None,
            offline_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status != DomainStatus::Unverified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_domain_is_unverified() {
        let d = CustomDomain::new("www.example.com", ProjectId::generate());
        assert_eq!(d.status, DomainStatus::Unverified);
        assert!(d.verification_token.starts_with("caravel-verify-"));
        assert!(!d.is_verified());
    }
}
