//! Single entry point for refresh cycles, shared by on-demand triggers and the scheduler
use super::{RefreshOrchestrator, RefreshSummary};
use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::error::RefreshError;
use crate::sources::{build_client, build_sources, CatalogSource, RateLimiter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

/// Where the service is in its cycle lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    Running,
    Finished,
}

/// Snapshot reported by status endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub running_since: Option<DateTime<Utc>>,
    pub last_summary: Option<RefreshSummary>,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self {
            state: RefreshState::Idle,
            running_since: None,
            last_summary: None,
        }
    }
}

fn write_status(status: &RwLock<RefreshStatus>) -> RwLockWriteGuard<'_, RefreshStatus> {
    status.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks the status `Running` for as long as it lives
///
/// If the cycle future is dropped midway the status falls back to its previous state
/// instead of reporting a run that no longer exists.
struct RunningStatus<'a> {
    status: &'a RwLock<RefreshStatus>,
    previous: RefreshState,
    finished: bool,
}

impl<'a> RunningStatus<'a> {
    fn enter(status: &'a RwLock<RefreshStatus>) -> Self {
        let mut current = write_status(status);
        let previous = current.state;
        current.state = RefreshState::Running;
        current.running_since = Some(Utc::now());
        Self {
            status,
            previous,
            finished: false,
        }
    }

    fn finish(mut self, summary: RefreshSummary) {
        let mut status = write_status(self.status);
        status.state = RefreshState::Finished;
        status.running_since = None;
        status.last_summary = Some(summary);
        self.finished = true;
    }
}

impl Drop for RunningStatus<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("⚠️ Refresh cycle dropped before finishing");
        let mut status = write_status(self.status);
        status.state = self.previous;
        status.running_since = None;
    }
}

/// Owns the sources, the store handle and the in-progress guard
///
/// At most one cycle runs at a time; a second trigger while one is running gets
/// `RefreshError::AlreadyRunning` instead of waiting.
pub struct RefreshService {
    store: Arc<dyn CatalogStore>,
    sources: Vec<Box<dyn CatalogSource>>,
    config: Arc<Config>,
    orchestrator: RefreshOrchestrator,
    guard: Mutex<()>,
    status: RwLock<RefreshStatus>,
    shutdown_tx: watch::Sender<bool>,
}

impl RefreshService {
    /// Service over the sources enabled in `config`
    pub fn from_config(config: Arc<Config>, store: Arc<dyn CatalogStore>) -> Self {
        let sources = build_sources(&config);
        Self::new(config, store, sources)
    }

    /// Service over an explicit source list
    pub fn new(config: Arc<Config>, store: Arc<dyn CatalogStore>, sources: Vec<Box<dyn CatalogSource>>) -> Self {
        let orchestrator = RefreshOrchestrator::new(build_client(&config.http), config.refresh.channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            sources,
            config,
            orchestrator,
            guard: Mutex::new(()),
            status: RwLock::new(RefreshStatus::default()),
            shutdown_tx,
        }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Receiver that flips to `true` once shutdown is requested
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Ask a running cycle (and the scheduler) to stop at the next record boundary
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    pub async fn status(&self) -> RefreshStatus {
        self.status
            .read()
            .map(|status| status.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Run one full refresh cycle now
    ///
    /// Fails only when another cycle holds the guard or the store cannot be reached
    /// before starting. Source failures are reported inside the summary.
    pub async fn run_refresh_cycle(&self) -> Result<RefreshSummary, RefreshError> {
        let _guard = self.guard.try_lock().map_err(|_| RefreshError::AlreadyRunning)?;

        let existing = match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                error!("❌ Catalog store unavailable, refresh not started: {}", e);
                return Err(RefreshError::StoreUnavailable(e));
            }
        };

        info!(
            "🔄 Starting refresh cycle: {} sources, {} titles in catalog",
            self.sources.len(),
            existing
        );
        let running = RunningStatus::enter(&self.status);

        let shutdown = self.shutdown_signal();
        let summary = self
            .orchestrator
            .run_cycle(&self.sources, self.store.as_ref(), RateLimiter::from_config(&self.config), &shutdown)
            .await;

        running.finish(summary.clone());
        Ok(summary)
    }
}
