//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::ControlError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{gc, publisher};

/// Run the control plane
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ControlError> {
    info!("Initializing Caravel control plane...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.max_shutdown_delay);

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start control plane: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), ControlError> {
    let app_state = Arc::new(AppState::init(options)?);

    init_server(
        options,
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    if options.enable_publisher {
        init_publisher_worker(
            options.publisher.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    if options.enable_gc_worker {
        init_gc_worker(
            options.gc_worker.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(())
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ControlError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(
        app_state.registry.clone(),
        app_state.rollback.clone(),
        app_state.provisioner.clone(),
        options.callback_secret.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

fn init_publisher_worker(
    options: publisher::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ControlError> {
    info!("Initializing publisher worker...");

    let registry = app_state.registry.clone();
    let finalizer = app_state.finalizer.clone();

    let publisher_handle = tokio::spawn(async move {
        publisher::run(
            &options,
            registry,
            finalizer,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_publisher_worker_handle(publisher_handle)?;
    Ok(())
}

fn init_gc_worker(
    options: gc::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ControlError> {
    info!("Initializing GC worker...");

    let collector = app_state.gc.clone();

    let gc_handle = tokio::spawn(async move {
        gc::run(
            &options,
            collector,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_gc_worker_handle(gc_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    max_shutdown_delay: std::time::Duration,
    server_handle: Option<JoinHandle<Result<(), ControlError>>>,
    publisher_worker_handle: Option<JoinHandle<()>>,
    gc_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, max_shutdown_delay: std::time::Duration) -> Self {
        Self {
            shutdown_tx,
            max_shutdown_delay,
            server_handle: None,
            publisher_worker_handle: None,
            gc_worker_handle: None,
        }
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ControlError>>,
    ) -> Result<(), ControlError> {
        if self.server_handle.is_some() {
            return Err(ControlError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub fn with_publisher_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), ControlError> {
        if self.publisher_worker_handle.is_some() {
            return Err(ControlError::ShutdownError("publisher_handle already set".to_string()));
        }
        self.publisher_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_gc_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), ControlError> {
        if self.gc_worker_handle.is_some() {
            return Err(ControlError::ShutdownError("gc_handle already set".to_string()));
        }
        self.gc_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ControlError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.max_shutdown_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ControlError> {
        info!("Shutting down control plane...");

        // 1. Publisher worker
        if let Some(handle) = self.publisher_worker_handle.take() {
            handle.await.map_err(|e| ControlError::ShutdownError(e.to_string()))?;
        }

        // 2. GC worker
        if let Some(handle) = self.gc_worker_handle.take() {
            handle.await.map_err(|e| ControlError::ShutdownError(e.to_string()))?;
        }

        // 3. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| ControlError::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
