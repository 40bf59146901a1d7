//! Interval-driven refresh loop
use super::RefreshService;
use crate::config::MIN_REFRESH_INTERVAL;
use crate::error::RefreshError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

/// Repeatedly triggers `RefreshService::run_refresh_cycle`
///
/// The first cycle starts immediately. A tick that lands while a cycle is still running
/// (for example one started from the API) is skipped, not queued.
pub struct RefreshScheduler {
    service: Arc<RefreshService>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(service: Arc<RefreshService>, interval: Duration) -> Self {
        let interval = if interval < MIN_REFRESH_INTERVAL {
            warn!(
                "Refresh interval {:?} below minimum, using {:?}",
                interval, MIN_REFRESH_INTERVAL
            );
            MIN_REFRESH_INTERVAL
        } else {
            interval
        };
        Self { service, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run on a background task until the service's shutdown signal fires
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(self) {
        let mut shutdown = self.service.shutdown_signal();
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("⏰ Refresh scheduler started (every {:?})", self.interval);

        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("⏹️ Refresh scheduler stopped");
    }

    async fn tick(&self) {
        match self.service.run_refresh_cycle().await {
            Ok(summary) => info!(
                "📊 Scheduled refresh: {} added, {} updated, status {:?}",
                summary.added, summary.updated, summary.status
            ),
            Err(RefreshError::AlreadyRunning) => {
                info!("⏭️ Refresh already in progress, skipping scheduled run")
            }
            Err(e) => error!("❌ Scheduled refresh failed: {}", e),
        }
    }
}
