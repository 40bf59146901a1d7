//! Catalog data model and storage
//!
//! A catalog row (`Title`) is created the first time any source reports a title and is
//! enriched in place by later sources. Rows are identified for deduplication by their
//! `MatchKey`: normalized title, year and media type.

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteCatalogStore;
pub use store::{CatalogStore, MemoryCatalogStore};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of media a title refers to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "series",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "series" => Ok(MediaType::Series),
            other => Err(format!("unknown media type: {}", other)),
        }
    }
}

/// Which adapter contributed a row's data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Wikipedia,
    Imdb,
    Tvmaze,
    Tmdb,
    Omdb,
    /// A stored source name this build does not know
    #[serde(other)]
    Unknown,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Wikipedia => "wikipedia",
            SourceTag::Imdb => "imdb",
            SourceTag::Tvmaze => "tvmaze",
            SourceTag::Tmdb => "tmdb",
            SourceTag::Omdb => "omdb",
            SourceTag::Unknown => "unknown",
        }
    }

    /// Lenient parse for values read back from storage
    ///
    /// Older databases may carry source names this build has no adapter for; those rows
    /// stay readable as `Unknown` instead of failing the whole query.
    pub fn from_stored(s: &str) -> Self {
        s.parse().unwrap_or(SourceTag::Unknown)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wikipedia" => Ok(SourceTag::Wikipedia),
            "imdb" => Ok(SourceTag::Imdb),
            "tvmaze" => Ok(SourceTag::Tvmaze),
            "tmdb" => Ok(SourceTag::Tmdb),
            "omdb" => Ok(SourceTag::Omdb),
            other => Err(format!("unknown source: {}", other)),
        }
    }
}

/// Deduplication key: (normalized title, year, media type)
///
/// Years compare strictly: a key without a year only equals another key without a year.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub title_key: String,
    pub year: Option<i32>,
    pub media_type: MediaType,
}

impl MatchKey {
    pub fn new(title: &str, year: Option<i32>, media_type: MediaType) -> Self {
        Self {
            title_key: normalize_title_key(title),
            year,
            media_type,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{}|{}|{}", self.title_key, year, self.media_type),
            None => write!(f, "{}|-|{}", self.title_key, self.media_type),
        }
    }
}

/// Case-folded, whitespace-collapsed form of a display title
pub fn normalize_title_key(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A normalized title record produced from one source, not yet merged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub media_type: MediaType,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub source: SourceTag,
    pub source_url: Option<String>,
    pub external_id: Option<String>,
}

impl Candidate {
    /// Minimal candidate with no optional metadata
    pub fn new(title: impl Into<String>, media_type: MediaType, year: Option<i32>, source: SourceTag) -> Self {
        Self {
            title: title.into(),
            media_type,
            year,
            description: None,
            release_date: None,
            rating: None,
            source,
            source_url: None,
            external_id: None,
        }
    }

    pub fn match_key(&self) -> MatchKey {
        MatchKey::new(&self.title, self.year, self.media_type)
    }
}

/// A catalog row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Title {
    pub id: i64,
    pub title: String,
    pub media_type: MediaType,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub source: SourceTag,
    pub source_url: Option<String>,
    pub external_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Title {
    /// Build a row from a candidate once the store has assigned an id
    pub fn from_candidate(id: i64, candidate: Candidate, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: candidate.title,
            media_type: candidate.media_type,
            year: candidate.year,
            description: candidate.description,
            release_date: candidate.release_date,
            rating: candidate.rating,
            source: candidate.source,
            source_url: candidate.source_url,
            external_id: candidate.external_id,
            updated_at,
        }
    }

    pub fn match_key(&self) -> MatchKey {
        MatchKey::new(&self.title, self.year, self.media_type)
    }
}
