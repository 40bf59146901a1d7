//! TMDB discover adapter (requires an API key)
use super::{log_page, CatalogSource, HttpFetcher, RawRecord, RecordSink};
use crate::catalog::{MediaType, SourceTag};
use crate::config::TmdbSourceConfig;
use crate::error::{FetchError, ParseError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct DiscoverPage {
    results: Option<Vec<DiscoverEntry>>,
}

#[derive(Debug, Deserialize)]
struct DiscoverEntry {
    id: Option<i64>,
    title: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    vote_average: Option<f64>,
    #[serde(default)]
    vote_count: u64,
}

pub struct TmdbSource {
    config: TmdbSourceConfig,
    api_key: String,
}

impl TmdbSource {
    /// `None` when no API key is configured
    pub fn new(config: TmdbSourceConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty())?;
        Some(Self { config, api_key })
    }
}

fn endpoint_path(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Series => "tv",
    }
}

#[async_trait]
impl CatalogSource for TmdbSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Tmdb
    }

    async fn fetch(&self, http: &mut HttpFetcher<'_>, sink: RecordSink) -> Result<(), FetchError> {
        info!("🎬 TMDB: {} discover pages per media type", self.config.page_limit);
        let base = self.config.api_base.trim_end_matches('/');

        for page in 1..=self.config.page_limit {
            for media_type in [MediaType::Movie, MediaType::Series] {
                let endpoint = format!("{}/discover/{}", base, endpoint_path(media_type));
                let what = format!("discover/{} page {}", endpoint_path(media_type), page);
                let params = [("api_key", self.api_key.clone()), ("page", page.to_string())];

                let body = match http.get_text_with_query(&endpoint, &params).await {
                    Ok(body) => body,
                    // 401 means the key is bad; no later page will do better
                    Err(FetchError::Status { status: 401, .. }) => {
                        return Err(FetchError::Config("TMDB rejected the API key".to_string()));
                    }
                    Err(e) => match http.skip_unless_fatal(&what, e) {
                        Some(fatal) => return Err(fatal),
                        None => continue,
                    },
                };

                let records = match parse_discover(&body, media_type, &self.config.site_base) {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(source = %self.tag(), "Skipping {}: {}", what, e);
                        continue;
                    }
                };
                log_page(self.tag(), &what, records.len());

                for record in records {
                    if !sink.send(record).await {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

/// Records from one discover response
///
/// Titles without votes report an average of 0; that is treated as no rating.
pub fn parse_discover(body: &str, media_type: MediaType, site_base: &str) -> Result<Vec<RawRecord>, ParseError> {
    let page: DiscoverPage = serde_json::from_str(body)?;
    let results = page.results.ok_or(ParseError::MissingField("results"))?;
    let site_base = site_base.trim_end_matches('/');

    Ok(results
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.or(entry.name).filter(|t| !t.trim().is_empty())?;
            let release_date = entry
                .release_date
                .or(entry.first_air_date)
                .filter(|d| !d.trim().is_empty());
            let rating = entry
                .vote_average
                .filter(|_| entry.vote_count > 0)
                .map(|avg| avg.to_string());

            Some(RawRecord {
                title,
                media_type: Some(media_type),
                release_date,
                description: entry.overview,
                rating,
                detail_url: entry
                    .id
                    .map(|id| format!("{}/{}/{}", site_base, endpoint_path(media_type), id)),
                external_id: entry.id.map(|id| id.to_string()),
                ..RawRecord::default()
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVIES: &str = r#"{
        "page": 1,
        "results": [
            {"id": 693134, "title": "Dune: Part Two", "release_date": "2024-02-27",
             "overview": "Follow the mythic journey of Paul Atreides.", "vote_average": 8.2, "vote_count": 5000},
            {"id": 1, "title": "Unreleased", "release_date": "", "overview": "", "vote_average": 0.0, "vote_count": 0},
            {"id": 2, "overview": "No title at all"}
        ],
        "total_pages": 500
    }"#;

    const SHOWS: &str = r#"{"results": [
        {"id": 1396, "name": "Breaking Bad", "first_air_date": "2008-01-20", "overview": "A chemist turns to crime.", "vote_average": 8.9, "vote_count": 13000}
    ]}"#;

    #[test]
    fn test_parse_discover_movies() {
        let records = parse_discover(MOVIES, MediaType::Movie, "https://www.themoviedb.org").unwrap();
        assert_eq!(records.len(), 2);

        let dune = &records[0];
        assert_eq!(dune.title, "Dune: Part Two");
        assert_eq!(dune.media_type, Some(MediaType::Movie));
        assert_eq!(dune.release_date.as_deref(), Some("2024-02-27"));
        assert_eq!(dune.rating.as_deref(), Some("8.2"));
        assert_eq!(dune.detail_url.as_deref(), Some("https://www.themoviedb.org/movie/693134"));
        assert_eq!(dune.external_id.as_deref(), Some("693134"));

        let unreleased = &records[1];
        assert_eq!(unreleased.release_date, None);
        assert_eq!(unreleased.rating, None);
    }

    #[test]
    fn test_parse_discover_tv_uses_name_and_first_air_date() {
        let records = parse_discover(SHOWS, MediaType::Series, "https://www.themoviedb.org/").unwrap();
        assert_eq!(records[0].title, "Breaking Bad");
        assert_eq!(records[0].release_date.as_deref(), Some("2008-01-20"));
        assert_eq!(records[0].detail_url.as_deref(), Some("https://www.themoviedb.org/tv/1396"));
    }

    #[test]
    fn test_error_body_is_rejected() {
        let err = parse_discover(
            r#"{"status_code": 34, "status_message": "The resource you requested could not be found."}"#,
            MediaType::Movie,
            "https://www.themoviedb.org",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::MissingField("results")));
    }

    #[test]
    fn test_source_requires_api_key() {
        assert!(TmdbSource::new(TmdbSourceConfig::default()).is_none());
        let keyed = TmdbSourceConfig {
            api_key: Some("  ".to_string()),
            ..TmdbSourceConfig::default()
        };
        assert!(TmdbSource::new(keyed).is_none());
        let keyed = TmdbSourceConfig {
            api_key: Some("abc".to_string()),
            ..TmdbSourceConfig::default()
        };
        assert!(TmdbSource::new(keyed).is_some());
    }
}
