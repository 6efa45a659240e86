//! Edge-hostname provisioning: the managed resource that lets the edge
//! network terminate TLS for a custom domain

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::errors::ControlError;

use super::CallLog;

/// Compliance state of an edge hostname.
///
/// `PendingFiling` is the ICP-style case: provisioning succeeded but the
/// hostname cannot go fully online until an external regulatory filing
/// completes. It is not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ComplianceState {
    Compliant,
    PendingFiling { detail: String },
}

/// A provisioned edge-hostname resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeHostname {
    pub id: String,
    pub hostname: String,
    pub compliance: ComplianceState,
}

/// Edge-hostname resource management
#[async_trait]
pub trait EdgeHostnames: Send + Sync {
    /// Request an edge hostname for an externally-owned domain and
    /// initiate its verification
    async fn create(&self, hostname: &str) -> Result<EdgeHostname, ControlError>;

    /// Delete a previously created resource; used to roll back partial
    /// provisioning so no orphaned managed resources remain
    async fn delete(&self, id: &str) -> Result<(), ControlError>;
}

/// HTTP client for the edge-hostname API
pub struct HttpEdgeHostnames {
    client: Client,
    base_url: String,
    api_token: String,
}

impl HttpEdgeHostnames {
    pub fn new(base_url: &str, api_token: String, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }
}

#[async_trait]
impl EdgeHostnames for HttpEdgeHostnames {
    async fn create(&self, hostname: &str) -> Result<EdgeHostname, ControlError> {
        let url = format!("{}/edge-hostnames", self.base_url);
        debug!("POST {} ({})", url, hostname);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .json(&serde_json::json!({ "hostname": hostname }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Edge hostname create failed: {} - {}", status, body);
            return Err(ControlError::DnsError(format!("{}: {}", status, body)));
        }

        let resource = response.json().await?;
        Ok(resource)
    }

    async fn delete(&self, id: &str) -> Result<(), ControlError> {
        let url = format!("{}/edge-hostnames/{}", self.base_url, id);
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .send()
            .await?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Edge hostname delete failed: {} - {}", status, body);
            return Err(ControlError::DnsError(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

/// In-memory edge-hostname double
#[derive(Debug, Default)]
pub struct MemoryEdgeHostnames {
    resources: RwLock<HashMap<String, EdgeHostname>>,
    log: CallLog,
    pending_filing: RwLock<Option<String>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl MemoryEdgeHostnames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Make subsequent creates report a pending regulatory filing
    pub fn set_pending_filing(&self, detail: Option<String>) {
        if let Ok(mut pending) = self.pending_filing.write() {
            *pending = detail;
        }
    }

    pub fn resource(&self, id: &str) -> Option<EdgeHostname> {
        self.resources.read().ok().and_then(|r| r.get(id).cloned())
    }

    pub fn resource_count(&self) -> usize {
        self.resources.read().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EdgeHostnames for MemoryEdgeHostnames {
    async fn create(&self, hostname: &str) -> Result<EdgeHostname, ControlError> {
        self.log.record(format!("hostnames.create {}", hostname));

        let compliance = match self.pending_filing.read().ok().and_then(|p| p.clone()) {
            Some(detail) => ComplianceState::PendingFiling { detail },
            None => ComplianceState::Compliant,
        };

        let id = format!(
            "eh-{}",
            self.next_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
        );
        let resource = EdgeHostname {
            id: id.clone(),
            hostname: hostname.to_string(),
            compliance,
        };
        self.resources
            .write()
            .map_err(|_| ControlError::DnsError("lock poisoned".into()))?
            .insert(id, resource.clone());
        Ok(resource)
    }

    async fn delete(&self, id: &str) -> Result<(), ControlError> {
        self.log.record(format!("hostnames.delete {}", id));
        self.resources
            .write()
            .map_err(|_| ControlError::DnsError("lock poisoned".into()))?
            .remove(id);
        Ok(())
    }
}
