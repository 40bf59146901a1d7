//! External catalog sources
//!
//! Each adapter turns one external origin (wiki list pages, a search/detail site, JSON
//! APIs) into a stream of `RawRecord`s. Adapters never touch the catalog: they push
//! records into a channel and the refresh orchestrator does the rest.

pub mod http;
pub mod imdb;
pub mod omdb;
pub mod rate_limit;
pub mod tmdb;
pub mod tvmaze;
pub mod wikipedia;

pub use http::{build_client, HttpFetcher};
pub use rate_limit::RateLimiter;

use crate::catalog::{MediaType, SourceTag};
use crate::config::Config;
use crate::error::FetchError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A title record as a source reported it, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub title: String,
    /// Media type known from where the record was found (e.g. a TV list page)
    pub media_type: Option<MediaType>,
    /// Free-text type marker such as "TV series" or "feature"
    pub media_hint: Option<String>,
    pub year: Option<i32>,
    pub year_text: Option<String>,
    pub description: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<String>,
    pub detail_url: Option<String>,
    pub external_id: Option<String>,
}

impl RawRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Sending half of the record channel handed to an adapter
///
/// Dropping it (by returning from `fetch`) ends the stream for the consumer.
pub struct RecordSink {
    tx: mpsc::Sender<RawRecord>,
}

impl RecordSink {
    pub fn new(tx: mpsc::Sender<RawRecord>) -> Self {
        Self { tx }
    }

    /// Hand a record to the consumer; `false` once the consumer has stopped listening
    pub async fn send(&self, record: RawRecord) -> bool {
        self.tx.send(record).await.is_ok()
    }
}

/// An external origin of catalog data
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn tag(&self) -> SourceTag;

    /// Stream raw records into `sink`
    ///
    /// Page- and item-level failures are logged and skipped. An `Err` means the whole
    /// source is unusable this cycle. When `sink.send` reports the consumer is gone, stop
    /// and return `Ok`.
    async fn fetch(&self, http: &mut HttpFetcher<'_>, sink: RecordSink) -> Result<(), FetchError>;
}

/// Instantiate every enabled source, in crawl order
pub fn build_sources(config: &Config) -> Vec<Box<dyn CatalogSource>> {
    let src = &config.sources;
    let mut sources: Vec<Box<dyn CatalogSource>> = Vec::new();

    if src.wikipedia.enabled {
        sources.push(Box::new(wikipedia::WikipediaSource::new(
            src.wikipedia.clone(),
            config.refresh.min_year,
        )));
    }

    if src.imdb.enabled {
        if src.imdb.queries.is_empty() {
            warn!("IMDb source enabled without queries, skipping");
        } else {
            sources.push(Box::new(imdb::ImdbSource::new(src.imdb.clone())));
        }
    }

    if src.tvmaze.enabled {
        sources.push(Box::new(tvmaze::TvmazeSource::new(src.tvmaze.clone())));
    }

    if src.tmdb.enabled {
        match tmdb::TmdbSource::new(src.tmdb.clone()) {
            Some(source) => sources.push(Box::new(source)),
            None => warn!("⚠️ TMDB enabled but no API key configured, skipping"),
        }
    }

    if src.omdb.enabled {
        match omdb::OmdbSource::new(src.omdb.clone()) {
            Some(source) if !src.omdb.queries.is_empty() => sources.push(Box::new(source)),
            Some(_) => warn!("OMDb source enabled without queries, skipping"),
            None => warn!("⚠️ OMDb enabled but no API key configured, skipping"),
        }
    }

    let names: Vec<&str> = sources.iter().map(|s| s.tag().as_str()).collect();
    info!("🔌 Enabled sources: {}", names.join(", "));
    sources
}

/// Log a record count for a finished page
pub(crate) fn log_page(source: SourceTag, what: &str, records: usize) {
    debug!(source = %source, "📄 {} yielded {} records", what, records);
}
