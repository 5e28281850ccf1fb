//! HTTP Server
//!
//! Binds the listener, serves the router until the shutdown signal fires,
//! then closes every open database.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ConfigHandle;
use crate::database::Registry;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

use super::build_router;

/// HTTP server for VaultKV
pub struct Server {
    dispatcher: Dispatcher,
    listener: TcpListener,
}

impl Server {
    /// Bind `addr`; port 0 picks a free port
    pub async fn bind(addr: SocketAddr, registry: Arc<Registry>, config: Arc<ConfigHandle>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            dispatcher: Dispatcher::new(registry, config),
            listener,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` completes, then close all databases
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registry = Arc::clone(self.dispatcher.registry());
        let router = build_router(self.dispatcher);

        let served = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        tracing::info!("Server stopped, closing databases");
        match tokio::task::spawn_blocking(move || registry.close_all()).await {
            Ok(closed) => tracing::debug!("{} databases closed on shutdown", closed),
            Err(e) => tracing::error!("Failed to close databases: {}", e),
        }

        served?;
        Ok(())
    }
}
