//! Garbage collection worker: periodic artifact cleanup

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::publish::GarbageCollector;

/// GC worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}

/// Run the GC worker.
///
/// Sweeps every project on a fixed interval, purging old success-terminal
/// deployments beyond the retention window. Opportunistic collection
/// also happens after each publish; this worker catches what those
/// passes miss.
pub async fn run<S, F>(
    options: &Options,
    gc: Arc<GarbageCollector>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("GC worker starting...");

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("GC worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with sweep
            }
        }

        debug!("Starting GC sweep...");

        match gc.sweep().await {
            Ok(purged) => {
                if purged > 0 {
                    info!("GC sweep purged {} deployments", purged);
                }
            }
            Err(e) => {
                error!("GC sweep failed: {}", e);
            }
        }
    }
}
