//! Catalog Engine - movie/TV catalog ingestion and merge
//!
//! Periodically pulls title records from external sources, normalizes them, deduplicates
//! them against the catalog and fills in missing metadata without overwriting data that
//! is already there.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod refresh;
pub mod sources;

#[cfg(feature = "api")]
pub mod api;

// Re-export main types for easy access
pub use crate::catalog::{
    Candidate, CatalogStore, MatchKey, MediaType, MemoryCatalogStore, SourceTag, SqliteCatalogStore, Title,
};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{FetchError, ParseError, RefreshError, StoreError, ValidationError};
pub use crate::ingest::{find_match, merge, normalize, upsert, MergeOutcome, UpsertAction};
pub use crate::refresh::{CycleStatus, RefreshScheduler, RefreshService, RefreshSummary};
pub use crate::sources::{build_sources, CatalogSource, RawRecord, RecordSink};
