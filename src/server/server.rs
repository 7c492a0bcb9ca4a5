use anyhow::{Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::api::AppState;

/// Server configuration
pub struct ServerConfig {
    pub host: [u8; 4],
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: [0, 0, 0, 0],
            port: 5000,
        }
    }
}

pub struct Server {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl Server {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Serve until the process is stopped
    pub async fn start(&self) -> Result<()> {
        let app = super::router(self.state.clone());
        let addr = SocketAddr::from((self.config.host, self.config.port));

        println!("\n{} Storefront watch listening", "🛒".green());
        println!("   POST http://localhost:{}/start_test", self.config.port);
        println!("   GET  http://localhost:{}/status/<session_id>", self.config.port);
        if self.state.store.is_none() {
            println!("   {}", "No log database configured; history is not persisted.".yellow());
        }
        println!("\n   Press Ctrl+C to stop.\n");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app.into_make_service()).await?;

        Ok(())
    }
}
