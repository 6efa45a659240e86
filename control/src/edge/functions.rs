//! Function platform client: named serverless functions with HTTP entry
//! points and custom-domain bindings

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::errors::ControlError;

use super::CallLog;

/// Desired state for a named function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    /// Object-storage key of the packaged artifact
    pub package_key: String,

    /// Command the platform runs to start the service
    pub start_command: String,

    /// Environment variables for the function
    pub env_vars: BTreeMap<String, String>,
}

/// Observed state of a deployed function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Invocation endpoint
    pub endpoint: String,

    /// Environment variables currently set on the function, including any
    /// set out of band
    pub env_vars: BTreeMap<String, String>,
}

/// Client for the serverless function platform
#[async_trait]
pub trait FunctionPlatform: Send + Sync {
    /// Current state of a named function, if it exists
    async fn describe(&self, name: &str) -> Result<Option<FunctionInfo>, ControlError>;

    /// Create or update the named function in place; returns its
    /// invocation endpoint
    async fn create_or_update(
        &self,
        name: &str,
        config: &FunctionConfig,
    ) -> Result<String, ControlError>;

    /// Ensure an HTTP entry point exists for the function; returns its URL
    async fn ensure_http_entry_point(&self, name: &str) -> Result<String, ControlError>;

    async fn delete(&self, name: &str) -> Result<(), ControlError>;

    /// Bind a hostname to the function. The platform validates that DNS
    /// for the hostname already resolves to its account-level endpoint,
    /// so the DNS record must exist before this is called.
    async fn create_or_update_custom_domain(
        &self,
        hostname: &str,
        name: &str,
    ) -> Result<(), ControlError>;

    async fn delete_custom_domain(&self, hostname: &str) -> Result<(), ControlError>;
}

/// HTTP client for the function platform API
pub struct HttpFunctionPlatform {
    client: Client,
    base_url: String,
    api_token: String,
}

impl HttpFunctionPlatform {
    pub fn new(base_url: &str, api_token: String, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.api_token)
    }

    async fn check(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, ControlError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Function platform {} failed: {} - {}", what, status, body);
            return Err(ControlError::FunctionPlatformError(format!(
                "{}: {}: {}",
                what, status, body
            )));
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct EntryPointResponse {
    url: String,
}

#[async_trait]
impl FunctionPlatform for HttpFunctionPlatform {
    async fn describe(&self, name: &str) -> Result<Option<FunctionInfo>, ControlError> {
        let url = format!("{}/functions/{}", self.base_url, name);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check(response, "describe").await?;
        let info = response.json().await?;
        Ok(Some(info))
    }

    async fn create_or_update(
        &self,
        name: &str,
        config: &FunctionConfig,
    ) -> Result<String, ControlError> {
        let url = format!("{}/functions/{}", self.base_url, name);
        debug!("PUT {}", url);

        let response = self
            .client
            .put(&url)
            .header(header::AUTHORIZATION, self.auth())
            .json(config)
            .send()
            .await?;

        let response = self.check(response, "create_or_update").await?;
        let body: EndpointResponse = response.json().await?;
        Ok(body.endpoint)
    }

    async fn ensure_http_entry_point(&self, name: &str) -> Result<String, ControlError> {
        let url = format!("{}/functions/{}/http", self.base_url, name);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await?;

        let response = self.check(response, "ensure_http_entry_point").await?;
        let body: EntryPointResponse = response.json().await?;
        Ok(body.url)
    }

    async fn delete(&self, name: &str) -> Result<(), ControlError> {
        let url = format!("{}/functions/{}", self.base_url, name);
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.check(response, "delete").await?;
        Ok(())
    }

    async fn create_or_update_custom_domain(
        &self,
        hostname: &str,
        name: &str,
    ) -> Result<(), ControlError> {
        let url = format!("{}/functions/{}/domains/{}", self.base_url, name, hostname);
        debug!("PUT {}", url);

        let response = self
            .client
            .put(&url)
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await?;

        self.check(response, "create_or_update_custom_domain").await?;
        Ok(())
    }

    async fn delete_custom_domain(&self, hostname: &str) -> Result<(), ControlError> {
        let url = format!("{}/domains/{}", self.base_url, hostname);
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.check(response, "delete_custom_domain").await?;
        Ok(())
    }
}

/// In-memory function platform double
#[derive(Debug, Default)]
pub struct MemoryFunctionPlatform {
    functions: RwLock<HashMap<String, FunctionInfo>>,
    bindings: RwLock<HashSet<String>>,
    log: CallLog,
    fail_updates: std::sync::atomic::AtomicBool,
}

impl MemoryFunctionPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Seed an existing function, e.g. with out-of-band env vars
    pub fn seed(&self, name: &str, info: FunctionInfo) {
        if let Ok(mut functions) = self.functions.write() {
            functions.insert(name.to_string(), info);
        }
    }

    pub fn function(&self, name: &str) -> Option<FunctionInfo> {
        self.functions.read().ok().and_then(|f| f.get(name).cloned())
    }

    pub fn has_binding(&self, hostname: &str) -> bool {
        self.bindings
            .read()
            .map(|b| b.contains(hostname))
            .unwrap_or(false)
    }
}

#[async_trait]
impl FunctionPlatform for MemoryFunctionPlatform {
    async fn describe(&self, name: &str) -> Result<Option<FunctionInfo>, ControlError> {
        self.log.record(format!("functions.describe {}", name));
        Ok(self.function(name))
    }

    async fn create_or_update(
        &self,
        name: &str,
        config: &FunctionConfig,
    ) -> Result<String, ControlError> {
        self.log.record(format!("functions.update {}", name));
        if self.fail_updates.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ControlError::FunctionPlatformError(
                "injected update failure".into(),
            ));
        }
        let endpoint = format!("https://{}.edge-fn.invoke", name);
        let info = FunctionInfo {
            endpoint: endpoint.clone(),
            env_vars: config.env_vars.clone(),
        };
        self.functions
            .write()
            .map_err(|_| ControlError::FunctionPlatformError("lock poisoned".into()))?
            .insert(name.to_string(), info);
        Ok(endpoint)
    }

    async fn ensure_http_entry_point(&self, name: &str) -> Result<String, ControlError> {
        self.log.record(format!("functions.entry_point {}", name));
        Ok(format!("https://{}.edge-fn.invoke", name))
    }

    async fn delete(&self, name: &str) -> Result<(), ControlError> {
        self.log.record(format!("functions.delete {}", name));
        self.functions
            .write()
            .map_err(|_| ControlError::FunctionPlatformError("lock poisoned".into()))?
            .remove(name);
        Ok(())
    }

    async fn create_or_update_custom_domain(
        &self,
        hostname: &str,
        name: &str,
    ) -> Result<(), ControlError> {
        self.log
            .record(format!("functions.bind_domain {} {}", hostname, name));
        self.bindings
            .write()
            .map_err(|_| ControlError::FunctionPlatformError("lock poisoned".into()))?
            .insert(hostname.to_string());
        Ok(())
    }

    async fn delete_custom_domain(&self, hostname: &str) -> Result<(), ControlError> {
        self.log
            .record(format!("functions.unbind_domain {}", hostname));
        self.bindings
            .write()
            .map_err(|_| ControlError::FunctionPlatformError("lock poisoned".into()))?
            .remove(hostname);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_platform_updates_in_place() {
        let platform = MemoryFunctionPlatform::new();
        let config = FunctionConfig {
            package_key: "pkg/a".to_string(),
            start_command: "python app.py".to_string(),
            env_vars: BTreeMap::from([("A".to_string(), "1".to_string())]),
        };
        let endpoint = platform.create_or_update("fn-shop", &config).await.unwrap();
        assert_eq!(endpoint, "https://fn-shop.edge-fn.invoke");

        let info = platform.describe("fn-shop").await.unwrap().unwrap();
        assert_eq!(info.env_vars.get("A"), Some(&"1".to_string()));
    }
}
