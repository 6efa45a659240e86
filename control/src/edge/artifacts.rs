//! Artifact storage client: object-store reclamation for superseded
//! deployments

use std::collections::HashSet;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, error};

use crate::errors::ControlError;

use super::CallLog;

/// Deletion interface over the artifact object store
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Delete every object under `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<(), ControlError>;
}

/// HTTP client for the artifact storage API
pub struct HttpArtifactStore {
    client: Client,
    base_url: String,
    api_token: String,
}

impl HttpArtifactStore {
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
impl ArtifactStore for HttpArtifactStore {
    async fn delete_prefix(&self, prefix: &str) -> Result<(), ControlError> {
        let url = format!("{}/objects?prefix={}", self.base_url, prefix);
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
            error!("Artifact delete failed: {} - {}", status, body);
            return Err(ControlError::ArtifactError(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

/// In-memory artifact store double recording deleted prefixes
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    deleted: RwLock<Vec<String>>,
    failing_prefixes: RwLock<HashSet<String>>,
    log: CallLog,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Make deletion of a specific prefix fail, for per-item skip tests
    pub fn fail_prefix(&self, prefix: &str) {
        if let Ok(mut failing) = self.failing_prefixes.write() {
            failing.insert(prefix.to_string());
        }
    }

    pub fn deleted_prefixes(&self) -> Vec<String> {
        self.deleted.read().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn delete_prefix(&self, prefix: &str) -> Result<(), ControlError> {
        self.log.record(format!("artifacts.delete {}", prefix));

        let failing = self
            .failing_prefixes
            .read()
            .map(|f| f.contains(prefix))
            .unwrap_or(false);
        if failing {
            return Err(ControlError::ArtifactError(format!(
                "injected delete failure for {}",
                prefix
            )));
        }

        self.deleted
            .write()
            .map_err(|_| ControlError::ArtifactError("lock poisoned".into()))?
            .push(prefix.to_string());
        Ok(())
    }
}
