//! Agent Server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use agentd_config::ServerConfig;

use crate::error::ApiError;
use crate::routes::create_router;
use crate::state::ApiState;

/// HTTP server bound next to the scheduler.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: Arc<ApiState>) -> Self {
        Self { config, state }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    pub fn state(&self) -> &Arc<ApiState> {
        &self.state
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ApiError> {
        let addr: SocketAddr = self
            .addr()
            .parse()
            .map_err(|e| ApiError::Internal(format!("Invalid listen address {}: {}", self.addr(), e)))?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to bind {}: {}", addr, e)))
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ApiError> {
        let app = create_router(self.state.clone());
        if let Ok(addr) = listener.local_addr() {
            info!("Agent server listening on {}", addr);
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

        info!("Agent server stopped");
        Ok(())
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), ApiError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}
