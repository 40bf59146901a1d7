//! API module for the catalog engine
//!
//! Exposes the catalog and the refresh trigger over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::refresh::RefreshService;

pub mod handlers;
pub mod models;
pub mod server;

/// API Server for catalog and refresh requests
pub struct ApiServer {
    service: Arc<RefreshService>,
    config: Arc<Config>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(service: Arc<RefreshService>, config: Arc<Config>) -> Self {
        Self { service, config }
    }

    /// Start the API server in the background
    pub fn start_background(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.start().await })
    }

    /// Start the API server
    pub async fn start(self) -> Result<()> {
        info!("🚀 Starting API server on port {}", self.config.server.port);
        server::start_http_server(self.service, self.config).await
    }
}
