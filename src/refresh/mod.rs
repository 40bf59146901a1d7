//! Refresh cycle orchestration
//!
//! A cycle walks every enabled source in order. For each source the adapter and a single
//! merge consumer run side by side over a bounded channel: the adapter produces raw
//! records, the consumer normalizes, matches and upserts them one at a time. A failing
//! source is recorded and the cycle moves on; a failing store stops the cycle.

pub mod scheduler;
pub mod service;

pub use scheduler::RefreshScheduler;
pub use service::{RefreshService, RefreshState, RefreshStatus};

use crate::catalog::{CatalogStore, SourceTag};
use crate::error::StoreError;
use crate::ingest::{normalize, upsert, UpsertAction};
use crate::sources::{CatalogSource, HttpFetcher, RateLimiter, RawRecord, RecordSink};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Overall outcome of a finished cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Success,
    PartialFailure,
}

/// Counters for one source within a cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceStats {
    pub seen: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub discarded: usize,
    pub error: Option<String>,
}

impl SourceStats {
    fn record(&mut self, action: UpsertAction) {
        match action {
            UpsertAction::Added => self.added += 1,
            UpsertAction::Updated => self.updated += 1,
            UpsertAction::Unchanged => self.unchanged += 1,
        }
    }
}

/// Result of one refresh cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshSummary {
    pub seen: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub discarded: usize,
    pub sources: BTreeMap<SourceTag, SourceStats>,
    pub failed_sources: BTreeSet<String>,
    /// Sources never started because the cycle stopped early
    pub skipped_sources: Vec<String>,
    /// Store error that stopped merging, if any
    pub aborted: Option<String>,
    pub cancelled: bool,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RefreshSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            seen: 0,
            added: 0,
            updated: 0,
            unchanged: 0,
            discarded: 0,
            sources: BTreeMap::new(),
            failed_sources: BTreeSet::new(),
            skipped_sources: Vec::new(),
            aborted: None,
            cancelled: false,
            status: CycleStatus::Success,
            started_at,
            finished_at: started_at,
        }
    }

    fn absorb(&mut self, tag: SourceTag, stats: SourceStats) {
        self.seen += stats.seen;
        self.added += stats.added;
        self.updated += stats.updated;
        self.unchanged += stats.unchanged;
        self.discarded += stats.discarded;
        if stats.error.is_some() {
            self.failed_sources.insert(tag.to_string());
        }
        self.sources.insert(tag, stats);
    }

    fn skip_rest(&mut self, rest: &[Box<dyn CatalogSource>]) {
        self.skipped_sources
            .extend(rest.iter().map(|s| s.tag().to_string()));
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.status = if self.failed_sources.is_empty() && self.aborted.is_none() {
            CycleStatus::Success
        } else {
            CycleStatus::PartialFailure
        };
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == CycleStatus::Success
    }
}

/// How the merge consumer stopped
enum ConsumerEnd {
    /// Channel drained: the adapter finished
    Drained,
    Cancelled,
    StoreFailed(StoreError),
}

/// Runs cycles over a fixed HTTP client; holds no catalog state
pub struct RefreshOrchestrator {
    client: Client,
    channel_capacity: usize,
}

impl RefreshOrchestrator {
    pub fn new(client: Client, channel_capacity: usize) -> Self {
        Self {
            client,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Run every source once, merging into `store`
    ///
    /// Never fails: source errors land in `failed_sources`, a store error sets `aborted`.
    pub async fn run_cycle(
        &self,
        sources: &[Box<dyn CatalogSource>],
        store: &dyn CatalogStore,
        mut limiter: RateLimiter,
        shutdown: &watch::Receiver<bool>,
    ) -> RefreshSummary {
        let mut summary = RefreshSummary::new(Utc::now());

        for (idx, source) in sources.iter().enumerate() {
            let tag = source.tag();
            let cancelled = *shutdown.borrow();
            if cancelled {
                info!("🛑 Shutdown requested, skipping remaining sources");
                summary.cancelled = true;
                summary.skip_rest(&sources[idx..]);
                break;
            }

            info!(source = %tag, "📥 Fetching from {}", tag);
            let (tx, rx) = mpsc::channel(self.channel_capacity);
            let mut http = HttpFetcher::new(self.client.clone(), tag, &mut limiter);

            let (fetched, (mut stats, end)) = tokio::join!(
                source.fetch(&mut http, RecordSink::new(tx)),
                consume(tag, rx, store, shutdown.clone())
            );

            match end {
                ConsumerEnd::StoreFailed(e) => {
                    error!(source = %tag, "❌ Catalog store failed, stopping cycle: {}", e);
                    stats.error = Some(e.to_string());
                    summary.aborted = Some(e.to_string());
                    summary.absorb(tag, stats);
                    summary.skip_rest(&sources[idx + 1..]);
                    break;
                }
                ConsumerEnd::Cancelled => {
                    info!(source = %tag, "🛑 Shutdown requested during {}", tag);
                    summary.cancelled = true;
                    summary.absorb(tag, stats);
                    summary.skip_rest(&sources[idx + 1..]);
                    break;
                }
                ConsumerEnd::Drained => {
                    if let Err(e) = fetched {
                        error!(source = %tag, "❌ Source {} failed: {}", tag, e);
                        stats.error = Some(e.to_string());
                    } else {
                        info!(
                            source = %tag,
                            "✅ {}: {} seen, {} added, {} updated, {} unchanged, {} discarded",
                            tag, stats.seen, stats.added, stats.updated, stats.unchanged, stats.discarded
                        );
                    }
                    summary.absorb(tag, stats);
                }
            }
        }

        let summary = summary.finish();
        info!(
            "🏁 Refresh cycle finished: {} added, {} updated, {} failed sources",
            summary.added,
            summary.updated,
            summary.failed_sources.len()
        );
        summary
    }
}

/// Single writer: normalize, match and merge records until the channel closes
async fn consume(
    tag: SourceTag,
    mut rx: mpsc::Receiver<RawRecord>,
    store: &dyn CatalogStore,
    shutdown: watch::Receiver<bool>,
) -> (SourceStats, ConsumerEnd) {
    let mut stats = SourceStats::default();

    while let Some(raw) = rx.recv().await {
        let cancelled = *shutdown.borrow();
        if cancelled {
            return (stats, ConsumerEnd::Cancelled);
        }

        stats.seen += 1;
        let candidate = match normalize(raw, tag) {
            Ok(candidate) => candidate,
            Err(e) => {
                debug!(source = %tag, "Discarding record: {}", e);
                stats.discarded += 1;
                continue;
            }
        };

        match upsert(store, candidate).await {
            Ok((_, action)) => stats.record(action),
            Err(e) => return (stats, ConsumerEnd::StoreFailed(e)),
        }
    }

    if stats.seen == 0 {
        warn!(source = %tag, "Source {} produced no records", tag);
    }
    (stats, ConsumerEnd::Drained)
}
