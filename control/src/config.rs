//! Settings file management

use std::path::Path;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::ControlError;
use crate::logs::LogLevel;

/// Control plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Apex domain platform hostnames are derived from
    #[serde(default = "default_apex_domain")]
    pub apex_domain: String,

    /// CNAME target externally-owned domains must point at
    #[serde(default = "default_edge_cname_target")]
    pub edge_cname_target: String,

    /// Account-level endpoint backend hostnames resolve to; the
    /// function-platform domain binding validates against this
    #[serde(default = "default_account_endpoint")]
    pub account_dns_endpoint: String,

    /// Shared secret for build-callback signatures
    #[serde(
        default = "default_callback_secret",
        serialize_with = "redact_secret"
    )]
    pub callback_secret: SecretString,

    /// Routing store (edge KV) endpoint
    #[serde(default = "EndpointSettings::routing")]
    pub routing_store: EndpointSettings,

    /// Function platform endpoint
    #[serde(default = "EndpointSettings::functions")]
    pub function_platform: EndpointSettings,

    /// DNS provider endpoint
    #[serde(default = "EndpointSettings::dns")]
    pub dns_provider: EndpointSettings,

    /// Edge-hostname provisioning endpoint
    #[serde(default = "EndpointSettings::edge_hostnames")]
    pub edge_hostnames: EndpointSettings,

    /// Artifact object storage endpoint
    #[serde(default = "EndpointSettings::artifacts")]
    pub artifact_store: EndpointSettings,

    /// Enable the publisher worker
    #[serde(default = "default_true")]
    pub enable_publisher: bool,

    /// Enable the periodic garbage-collection worker
    #[serde(default = "default_true")]
    pub enable_gc_worker: bool,

    /// Publisher polling interval in seconds
    #[serde(default = "default_publisher_interval")]
    pub publisher_interval_secs: u64,

    /// GC sweep interval in seconds
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,

    /// Success-terminal deployments kept per project/environment beyond
    /// the protected set
    #[serde(default = "default_gc_keep_count")]
    pub gc_keep_count: usize,
}

fn default_true() -> bool {
    true
}

fn default_apex_domain() -> String {
    "caravel.app".to_string()
}

fn default_edge_cname_target() -> String {
    "edge.caravel.app".to_string()
}

fn default_account_endpoint() -> String {
    "ingress.caravel.app".to_string()
}

fn default_callback_secret() -> SecretString {
    SecretString::from("dev-only-secret")
}

fn default_publisher_interval() -> u64 {
    5
}

fn default_gc_interval() -> u64 {
    3600
}

fn default_gc_keep_count() -> usize {
    3
}

fn redact_secret<S>(_: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("<redacted>")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server: ServerSettings::default(),
            apex_domain: default_apex_domain(),
            edge_cname_target: default_edge_cname_target(),
            account_dns_endpoint: default_account_endpoint(),
            callback_secret: default_callback_secret(),
            routing_store: EndpointSettings::routing(),
            function_platform: EndpointSettings::functions(),
            dns_provider: EndpointSettings::dns(),
            edge_hostnames: EndpointSettings::edge_hostnames(),
            artifact_store: EndpointSettings::artifacts(),
            enable_publisher: true,
            enable_gc_worker: true,
            publisher_interval_secs: default_publisher_interval(),
            gc_interval_secs: default_gc_interval(),
            gc_keep_count: default_gc_keep_count(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: &Path) -> Result<Self, ControlError> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Settings for one upstream service client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    pub base_url: String,

    #[serde(default)]
    pub api_token: String,

    /// Bounded request timeout; no external call may hang the state machine
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl EndpointSettings {
    fn with_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }

    fn routing() -> Self {
        Self::with_url("http://localhost:8781")
    }

    fn functions() -> Self {
        Self::with_url("http://localhost:8782")
    }

    fn dns() -> Self {
        Self::with_url("http://localhost:8783")
    }

    fn edge_hostnames() -> Self {
        Self::with_url("http://localhost:8784")
    }

    fn artifacts() -> Self {
        Self::with_url("http://localhost:8785")
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.gc_keep_count, 3);
        assert_eq!(settings.apex_domain, "caravel.app");
        assert!(settings.enable_publisher);
    }

    #[test]
    fn test_secret_not_serialized() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("dev-only-secret"));
        assert!(json.contains("<redacted>"));
    }
}
