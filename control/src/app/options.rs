//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::config::Settings;
use crate::workers::{gc, publisher};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Apex domain platform hostnames are derived from
    pub apex_domain: String,

    /// CNAME target externally-owned domains must point at
    pub edge_cname_target: String,

    /// Account-level endpoint backend hostnames resolve to
    pub account_dns_endpoint: String,

    /// Shared secret for build-callback signatures
    pub callback_secret: SecretString,

    /// Upstream service clients
    pub clients: ClientOptions,

    /// Enable the publisher worker
    pub enable_publisher: bool,

    /// Enable the periodic garbage-collection worker
    pub enable_gc_worker: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Publisher worker options
    pub publisher: publisher::Options,

    /// GC worker options
    pub gc_worker: gc::Options,

    /// Success-terminal deployments kept per project/environment
    pub gc_keep_count: usize,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl AppOptions {
    /// Build options from a settings file
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            apex_domain: settings.apex_domain.clone(),
            edge_cname_target: settings.edge_cname_target.clone(),
            account_dns_endpoint: settings.account_dns_endpoint.clone(),
            callback_secret: settings.callback_secret.clone(),
            clients: ClientOptions {
                routing_store: EndpointOptions::from_settings(&settings.routing_store),
                function_platform: EndpointOptions::from_settings(&settings.function_platform),
                dns_provider: EndpointOptions::from_settings(&settings.dns_provider),
                edge_hostnames: EndpointOptions::from_settings(&settings.edge_hostnames),
                artifact_store: EndpointOptions::from_settings(&settings.artifact_store),
            },
            enable_publisher: settings.enable_publisher,
            enable_gc_worker: settings.enable_gc_worker,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            publisher: publisher::Options {
                interval: Duration::from_secs(settings.publisher_interval_secs),
            },
            gc_worker: gc::Options {
                interval: Duration::from_secs(settings.gc_interval_secs),
            },
            gc_keep_count: settings.gc_keep_count,
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Connection options for the upstream service clients
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub routing_store: EndpointOptions,
    pub function_platform: EndpointOptions,
    pub dns_provider: EndpointOptions,
    pub edge_hostnames: EndpointOptions,
    pub artifact_store: EndpointOptions,
}

/// One upstream endpoint
#[derive(Debug, Clone)]
pub struct EndpointOptions {
    pub base_url: String,
    pub api_token: String,
    pub timeout: Duration,
}

impl EndpointOptions {
    fn from_settings(settings: &crate::config::EndpointSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            api_token: settings.api_token.clone(),
            timeout: settings.timeout(),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}
