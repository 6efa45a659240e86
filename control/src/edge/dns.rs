//! DNS provider client: record lookups for domain verification and
//! record creation for backend hostname wiring

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::errors::ControlError;

use super::CallLog;

/// DNS record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordKind {
    A,
    Cname,
    Txt,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::A => f.write_str("A"),
            RecordKind::Cname => f.write_str("CNAME"),
            RecordKind::Txt => f.write_str("TXT"),
        }
    }
}

/// DNS lookups and managed-zone record writes
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// TXT record values at `name`
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ControlError>;

    /// CNAME target of `name`, if any
    async fn lookup_cname(&self, name: &str) -> Result<Option<String>, ControlError>;

    /// Create (or replace) a record in the platform's managed zone
    async fn create_record(
        &self,
        name: &str,
        kind: RecordKind,
        value: &str,
    ) -> Result<(), ControlError>;
}

/// HTTP client for the DNS provider API
pub struct HttpDnsProvider {
    client: Client,
    base_url: String,
    api_token: String,
}

impl HttpDnsProvider {
    pub fn new(base_url: &str, api_token: String, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    values: Vec<String>,
}

#[async_trait]
impl DnsProvider for HttpDnsProvider {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ControlError> {
        let url = format!("{}/lookup/{}/TXT", self.base_url, name);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("DNS TXT lookup failed: {} - {}", status, body);
            return Err(ControlError::DnsError(format!("{}: {}", status, body)));
        }

        let body: LookupResponse = response.json().await?;
        Ok(body.values)
    }

    async fn lookup_cname(&self, name: &str) -> Result<Option<String>, ControlError> {
        let url = format!("{}/lookup/{}/CNAME", self.base_url, name);
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
            error!("DNS CNAME lookup failed: {} - {}", status, body);
            return Err(ControlError::DnsError(format!("{}: {}", status, body)));
        }

        let body: LookupResponse = response.json().await?;
        Ok(body.values.into_iter().next())
    }

    async fn create_record(
        &self,
        name: &str,
        kind: RecordKind,
        value: &str,
    ) -> Result<(), ControlError> {
        let url = format!("{}/records", self.base_url);
        debug!("POST {} ({} {} -> {})", url, kind, name, value);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .json(&serde_json::json!({
                "name": name,
                "type": kind,
                "value": value,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("DNS record create failed: {} - {}", status, body);
            return Err(ControlError::DnsError(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

/// In-memory DNS double with seedable records
#[derive(Debug, Default)]
pub struct MemoryDnsProvider {
    records: RwLock<HashMap<(String, RecordKind), Vec<String>>>,
    log: CallLog,
}

impl MemoryDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Seed a record as if the domain owner had configured it
    pub fn seed(&self, name: &str, kind: RecordKind, value: &str) {
        if let Ok(mut records) = self.records.write() {
            records
                .entry((name.to_string(), kind))
                .or_default()
                .push(value.to_string());
        }
    }

    pub fn record_values(&self, name: &str, kind: RecordKind) -> Vec<String> {
        self.records
            .read()
            .ok()
            .and_then(|r| r.get(&(name.to_string(), kind)).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsProvider {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ControlError> {
        Ok(self.record_values(name, RecordKind::Txt))
    }

    async fn lookup_cname(&self, name: &str) -> Result<Option<String>, ControlError> {
        Ok(self.record_values(name, RecordKind::Cname).into_iter().next())
    }

    async fn create_record(
        &self,
        name: &str,
        kind: RecordKind,
        value: &str,
    ) -> Result<(), ControlError> {
        self.log
            .record(format!("dns.create_record {} {} {}", kind, name, value));
        self.seed(name, kind, value);
        Ok(())
    }
}
