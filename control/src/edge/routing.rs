//! Routing store client: hostname -> routing record in the edge KV store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::errors::ControlError;
use crate::models::deployment::DeploymentId;

use super::CallLog;

/// The JSON value stored in the edge KV store describing how a hostname
/// is served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RoutingRecord {
    Static {
        /// Per-deployment artifact path; never the mutable "latest" path,
        /// so superseded versions stay independently addressable
        #[serde(rename = "artifactPath")]
        artifact_path: String,

        #[serde(rename = "isSpa")]
        is_spa: bool,

        #[serde(rename = "deploymentId")]
        deployment_id: DeploymentId,

        revision: String,

        #[serde(rename = "updatedAt")]
        updated_at: DateTime<Utc>,

        /// Access-password hash for staging hostnames
        #[serde(rename = "passwordHash", skip_serializing_if = "Option::is_none")]
        password_hash: Option<String>,
    },
    Backend {
        endpoint: String,

        #[serde(rename = "deploymentId")]
        deployment_id: DeploymentId,

        revision: String,

        #[serde(rename = "updatedAt")]
        updated_at: DateTime<Utc>,
    },
}

impl RoutingRecord {
    pub fn deployment_id(&self) -> &DeploymentId {
        match self {
            RoutingRecord::Static { deployment_id, .. } => deployment_id,
            RoutingRecord::Backend { deployment_id, .. } => deployment_id,
        }
    }
}

/// Typed wrapper over the edge key-value store
#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn put(&self, hostname: &str, record: &RoutingRecord) -> Result<(), ControlError>;

    async fn get(&self, hostname: &str) -> Result<Option<RoutingRecord>, ControlError>;

    async fn delete(&self, hostname: &str) -> Result<(), ControlError>;

    /// Invalidate cached responses for the given hostnames. Callers treat
    /// this as best-effort.
    async fn purge_cache(&self, hostnames: &[String]) -> Result<(), ControlError>;
}

/// HTTP client for the edge KV API
pub struct HttpRoutingStore {
    client: Client,
    base_url: String,
    api_token: String,
}

impl HttpRoutingStore {
    pub fn new(base_url: &str, api_token: String, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn url(&self, hostname: &str) -> String {
        format!("{}/routes/{}", self.base_url, hostname)
    }
}

#[async_trait]
impl RoutingStore for HttpRoutingStore {
    async fn put(&self, hostname: &str, record: &RoutingRecord) -> Result<(), ControlError> {
        let url = self.url(hostname);
        debug!("PUT {}", url);

        let response = self
            .client
            .put(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Routing store PUT failed: {} - {}", status, body);
            return Err(ControlError::RoutingError(format!("{}: {}", status, body)));
        }
        Ok(())
    }

    async fn get(&self, hostname: &str) -> Result<Option<RoutingRecord>, ControlError> {
        let url = self.url(hostname);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Routing store GET failed: {} - {}", status, body);
            return Err(ControlError::RoutingError(format!("{}: {}", status, body)));
        }

        let record = response.json().await?;
        Ok(Some(record))
    }

    async fn delete(&self, hostname: &str) -> Result<(), ControlError> {
        let url = self.url(hostname);
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
            error!("Routing store DELETE failed: {} - {}", status, body);
            return Err(ControlError::RoutingError(format!("{}: {}", status, body)));
        }
        Ok(())
    }

    async fn purge_cache(&self, hostnames: &[String]) -> Result<(), ControlError> {
        let url = format!("{}/cache/purge", self.base_url);
        debug!("POST {} ({} hostnames)", url, hostnames.len());

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .json(&serde_json::json!({ "hostnames": hostnames }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Cache purge failed: {} - {}", status, body);
            return Err(ControlError::RoutingError(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

/// In-memory routing store double
#[derive(Debug, Default)]
pub struct MemoryRoutingStore {
    records: RwLock<HashMap<String, RoutingRecord>>,
    log: CallLog,
    fail_puts: AtomicBool,
}

impl MemoryRoutingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            log,
            fail_puts: AtomicBool::new(false),
        }
    }

    /// Make subsequent `put` calls fail, for partial-failure tests
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn record_for(&self, hostname: &str) -> Option<RoutingRecord> {
        self.records
            .read()
            .ok()
            .and_then(|r| r.get(hostname).cloned())
    }
}

#[async_trait]
impl RoutingStore for MemoryRoutingStore {
    async fn put(&self, hostname: &str, record: &RoutingRecord) -> Result<(), ControlError> {
        self.log.record(format!("routing.put {}", hostname));
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ControlError::RoutingError("injected put failure".into()));
        }
        self.records
            .write()
            .map_err(|_| ControlError::RoutingError("lock poisoned".into()))?
            .insert(hostname.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, hostname: &str) -> Result<Option<RoutingRecord>, ControlError> {
        Ok(self.record_for(hostname))
    }

    async fn delete(&self, hostname: &str) -> Result<(), ControlError> {
        self.log.record(format!("routing.delete {}", hostname));
        self.records
            .write()
            .map_err(|_| ControlError::RoutingError("lock poisoned".into()))?
            .remove(hostname);
        Ok(())
    }

    async fn purge_cache(&self, hostnames: &[String]) -> Result<(), ControlError> {
        self.log
            .record(format!("routing.purge_cache {}", hostnames.join(",")));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_shape() {
        let record = RoutingRecord::Backend {
            endpoint: "https://fn-shop.edge.example".to_string(),
            deployment_id: DeploymentId::new("d-1"),
            revision: "abc123".to_string(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "backend");
        assert_eq!(json["deploymentId"], "d-1");

        let record = RoutingRecord::Static {
            artifact_path: "sites/blog/d-2".to_string(),
            is_spa: true,
            deployment_id: DeploymentId::new("d-2"),
            revision: "def456".to_string(),
            updated_at: Utc::now(),
            password_hash: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "static");
        assert_eq!(json["isSpa"], true);
        assert!(json.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryRoutingStore::new();
        let record = RoutingRecord::Backend {
            endpoint: "https://e".to_string(),
            deployment_id: DeploymentId::new("d"),
            revision: "r".to_string(),
            updated_at: Utc::now(),
        };
        store.put("x.caravel.app", &record).await.unwrap();
        assert_eq!(store.get("x.caravel.app").await.unwrap(), Some(record));
        store.delete("x.caravel.app").await.unwrap();
        assert_eq!(store.get("x.caravel.app").await.unwrap(), None);
    }
}
