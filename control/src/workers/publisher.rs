//! Publisher worker: finalizes uploaded deployments

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::models::status::DeploymentStatus;
use crate::publish::{BufferSink, Finalizer};
use crate::registry::{DeploymentFilter, Registry};

/// Publisher worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Run the publisher worker.
///
/// Polls for deployments that have finished uploading and runs each one
/// through finalization. Per-deployment failures are recorded on the
/// deployment itself and never stop the loop.
pub async fn run<S, F>(
    options: &Options,
    registry: Arc<dyn Registry>,
    finalizer: Arc<Finalizer>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Publisher worker starting...");

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Publisher worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with check
            }
        }

        debug!("Checking for deployments to publish...");

        let pending = match registry
            .list_deployments(&DeploymentFilter::new().with_status(DeploymentStatus::Deploying))
            .await
        {
            Ok(deployments) => deployments,
            Err(e) => {
                error!("Failed to poll for pending deployments: {}", e);
                continue;
            }
        };

        for deployment in pending {
            info!(deployment_id = %deployment.id, "Publishing deployment");

            let log = BufferSink::new();
            let result = finalizer.finalize(&deployment.id, &log).await;

            let contents = log.contents();
            if !contents.is_empty() {
                if let Err(e) = registry.append_build_log(&deployment.id, &contents).await {
                    warn!(deployment_id = %deployment.id, error = %e, "Failed to persist publish log");
                }
            }

            match result {
                Ok(()) => {
                    info!(deployment_id = %deployment.id, "Deployment published");
                }
                Err(e) => {
                    error!(deployment_id = %deployment.id, "Publish failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::edge::artifacts::MemoryArtifactStore;
    use crate::edge::dns::MemoryDnsProvider;
    use crate::edge::functions::MemoryFunctionPlatform;
    use crate::edge::routing::{MemoryRoutingStore, RoutingStore};
    use crate::edge::CallLog;
    use crate::models::deployment::{Deployment, Revision};
    use crate::models::project::{Project, ProjectType};
    use crate::publish::GarbageCollector;
    use crate::registry::MemoryRegistry;

    fn finalizer(
        registry: Arc<MemoryRegistry>,
        routing: Arc<MemoryRoutingStore>,
    ) -> Arc<Finalizer> {
        let calls = CallLog::new();
        let artifacts = Arc::new(MemoryArtifactStore::with_log(calls.clone()));
        let gc = Arc::new(GarbageCollector::new(registry.clone(), artifacts, 3));
        Arc::new(Finalizer::new(
            registry,
            routing,
            Arc::new(MemoryFunctionPlatform::with_log(calls.clone())),
            Arc::new(MemoryDnsProvider::with_log(calls)),
            gc,
            "caravel.app".to_string(),
            "ingress.caravel.app".to_string(),
        ))
    }

    #[tokio::test]
    async fn test_publishes_pending_deployment_and_stops_on_shutdown() {
        let registry = Arc::new(MemoryRegistry::new());
        let routing = Arc::new(MemoryRoutingStore::with_log(CallLog::new()));

        let project = Project::new("docs", ProjectType::Static);
        registry.insert_project(&project).await.unwrap();

        let mut deployment = Deployment::new(project.id.clone(), Revision::default(), false);
        deployment.status = DeploymentStatus::Deploying;
        registry.insert_deployment(&deployment).await.unwrap();

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
        let worker_registry: Arc<dyn Registry> = registry.clone();
        let worker_finalizer = finalizer(registry.clone(), routing.clone());

        let options = Options {
            interval: Duration::from_millis(1),
        };
        let handle = tokio::spawn(async move {
            run(
                &options,
                worker_registry,
                worker_finalizer,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });

        // Wait for the worker to pick up and publish the deployment
        for _ in 0..100 {
            let current = registry.deployment(&deployment.id).await.unwrap().unwrap();
            if current.status == DeploymentStatus::Deployed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let published = registry.deployment(&deployment.id).await.unwrap().unwrap();
        assert_eq!(published.status, DeploymentStatus::Deployed);
        assert!(routing
            .get("docs.caravel.app")
            .await
            .unwrap()
            .is_some());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
