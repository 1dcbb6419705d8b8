use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum_server::Handle;
use blob_store::BlobStorage;
use secure_links::{SecureLinkRegistry, Sweeper};
use tokio::{
    self,
    signal,
    sync::{watch, Mutex},
};
use tracing::info;

use crate::{
    access::LinkIssuer,
    catalog::FileCatalog,
    config::ServerConfig,
    routes::{create_routes, RouteState},
};

#[derive(Clone)]
pub struct Service {
    pub config: ServerConfig,
    pub shutdown_tx: watch::Sender<()>,
    pub shutdown_rx: watch::Receiver<()>,
    pub blob_storage: Arc<BlobStorage>,
    pub registry: Arc<SecureLinkRegistry>,
    pub catalog: Arc<FileCatalog>,
    pub issuer: Arc<LinkIssuer>,
    pub sweeper: Arc<Mutex<Sweeper>>,
}

impl Service {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let blob_storage = Arc::new(
            BlobStorage::new(config.blob_storage.clone())
                .context("error initializing BlobStorage")?,
        );

        let registry = Arc::new(SecureLinkRegistry::in_memory(blob_storage.clone()));
        let catalog = Arc::new(FileCatalog::new());
        let issuer = Arc::new(LinkIssuer::new(
            blob_storage.clone(),
            registry.clone(),
            config.links.clone(),
            &config.public_base_url,
        ));

        let sweeper = Arc::new(Mutex::new(Sweeper::new(
            registry.store(),
            Duration::from_secs(config.links.sweep_interval_secs),
            shutdown_rx.clone(),
        )));

        Ok(Self {
            config,
            shutdown_tx,
            shutdown_rx,
            blob_storage,
            registry,
            catalog,
            issuer,
            sweeper,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let sweeper = self.sweeper.clone();
        tokio::spawn(async move {
            let mut sweeper_guard = sweeper.lock().await;
            sweeper_guard.start().await;
        });

        let route_state = RouteState {
            blob_storage: self.blob_storage.clone(),
            registry: self.registry.clone(),
            catalog: self.catalog.clone(),
            issuer: self.issuer.clone(),
        };

        let handle = Handle::new();
        let handle_sh = handle.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh, shutdown_tx).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!("server api listening on {}", self.config.listen_addr);
        let routes = create_routes(route_state);
        axum_server::bind(addr)
            .handle(handle)
            .serve(routes.into_make_service())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal(handle: Handle, shutdown_tx: watch::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.shutdown();
    let _ = shutdown_tx.send(());
    info!("signal received, shutting down server gracefully");
}
