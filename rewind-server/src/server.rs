use crate::api::{create_router, AppState};
use axum::Router;
use rewind_core::{RewindConfig, RollbackEngine};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub struct RewindServer {
    engine: Arc<RollbackEngine>,
}

impl RewindServer {
    pub fn new(config: RewindConfig) -> Self {
        Self::with_engine(Arc::new(RollbackEngine::new(config)))
    }

    pub fn with_engine(engine: Arc<RollbackEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RollbackEngine> {
        &self.engine
    }

    pub fn router(&self) -> Router {
        create_router(AppState {
            engine: Arc::clone(&self.engine),
        })
    }

    /// Serves until Ctrl-C.
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        info!(
            "Metadata directory: {}, git timeout: {}s",
            self.engine.config().metadata_dir,
            self.engine.config().git_timeout_secs
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
