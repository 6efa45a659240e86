//! Shared application state

use std::sync::Arc;

use crate::app::options::{AppOptions, EndpointOptions};
use crate::edge::artifacts::{ArtifactStore, HttpArtifactStore};
use crate::edge::dns::{DnsProvider, HttpDnsProvider};
use crate::edge::functions::{FunctionPlatform, HttpFunctionPlatform};
use crate::edge::hostnames::{EdgeHostnames, HttpEdgeHostnames};
use crate::edge::routing::{HttpRoutingStore, RoutingStore};
use crate::errors::ControlError;
use crate::publish::{DomainProvisioner, Finalizer, GarbageCollector, RollbackEngine};
use crate::registry::{MemoryRegistry, Registry};

/// Shared application state: the registry, upstream clients and the
/// engines built on top of them
pub struct AppState {
    pub registry: Arc<dyn Registry>,
    pub routing: Arc<dyn RoutingStore>,
    pub functions: Arc<dyn FunctionPlatform>,
    pub dns: Arc<dyn DnsProvider>,
    pub hostnames: Arc<dyn EdgeHostnames>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub gc: Arc<GarbageCollector>,
    pub finalizer: Arc<Finalizer>,
    pub rollback: Arc<RollbackEngine>,
    pub provisioner: Arc<DomainProvisioner>,
}

impl AppState {
    /// Initialize the application state from options
    pub fn init(options: &AppOptions) -> Result<Self, ControlError> {
        let registry: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());

        let routing: Arc<dyn RoutingStore> =
            Arc::new(http_client(&options.clients.routing_store, HttpRoutingStore::new)?);
        let functions: Arc<dyn FunctionPlatform> = Arc::new(http_client(
            &options.clients.function_platform,
            HttpFunctionPlatform::new,
        )?);
        let dns: Arc<dyn DnsProvider> =
            Arc::new(http_client(&options.clients.dns_provider, HttpDnsProvider::new)?);
        let hostnames: Arc<dyn EdgeHostnames> =
            Arc::new(http_client(&options.clients.edge_hostnames, HttpEdgeHostnames::new)?);
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(http_client(&options.clients.artifact_store, HttpArtifactStore::new)?);

        let gc = Arc::new(GarbageCollector::new(
            registry.clone(),
            artifacts.clone(),
            options.gc_keep_count,
        ));

        let finalizer = Arc::new(Finalizer::new(
            registry.clone(),
            routing.clone(),
            functions.clone(),
            dns.clone(),
            gc.clone(),
            options.apex_domain.clone(),
            options.account_dns_endpoint.clone(),
        ));

        let rollback = Arc::new(RollbackEngine::new(registry.clone(), finalizer.clone()));

        let provisioner = Arc::new(DomainProvisioner::new(
            registry.clone(),
            routing.clone(),
            dns.clone(),
            hostnames.clone(),
            options.apex_domain.clone(),
            options.edge_cname_target.clone(),
        ));

        Ok(Self {
            registry,
            routing,
            functions,
            dns,
            hostnames,
            artifacts,
            gc,
            finalizer,
            rollback,
            provisioner,
        })
    }
}

fn http_client<T>(
    options: &EndpointOptions,
    build: impl Fn(&str, String, std::time::Duration) -> Result<T, ControlError>,
) -> Result<T, ControlError> {
    build(&options.base_url, options.api_token.clone(), options.timeout)
}
