//! runbox server.
//!
//! Exposes the execution engine over HTTP and WebSocket.
//!
//! # Routes
//!
//! - `GET /health` - Health check
//! - `GET /ws` - Run programs and stream their output (`run`, `input`, `stop`)
//! - `POST /api/input` - Send a line of input to a session
//! - `POST /api/stop` - Stop a session
//! - `POST /api/publish` - Build a downloadable archive
//! - `GET /api/publish/{id}/{file}` - Download a published archive

pub mod artifacts;
pub mod error;
pub mod protocol;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use runbox_core::{EngineConfig, ExecutionEngine};

pub use artifacts::ArtifactStore;
pub use error::{ServerError, ServerResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use routes::{AppState, create_router};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Start the runbox server.
pub async fn serve(engine_config: EngineConfig, config: ServerConfig) -> ServerResult<()> {
    let engine = Arc::new(ExecutionEngine::new(engine_config)?);
    let state = Arc::new(AppState::new(engine));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("Invalid address: {}:{}", config.host, config.port)))?;

    tracing::info!("Starting runbox server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
    }
}
