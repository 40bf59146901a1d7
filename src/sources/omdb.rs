//! OMDb search adapter (requires an API key)
use super::{log_page, CatalogSource, HttpFetcher, RawRecord, RecordSink};
use crate::catalog::{MediaType, SourceTag};
use crate::config::OmdbSourceConfig;
use crate::error::{FetchError, ParseError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    response: Option<String>,
    error: Option<String>,
    search: Option<Vec<SearchEntry>>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Year")]
    year: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
}

/// One page of search results
#[derive(Debug, Default, PartialEq)]
pub struct SearchPage {
    pub records: Vec<RawRecord>,
    /// Message from a `"Response": "False"` body
    pub error: Option<String>,
}

impl SearchPage {
    fn rejects_key(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.to_lowercase().contains("api key"))
    }
}

pub struct OmdbSource {
    config: OmdbSourceConfig,
    api_key: String,
}

impl OmdbSource {
    /// `None` when no API key is configured
    pub fn new(config: OmdbSourceConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty())?;
        Some(Self { config, api_key })
    }
}

#[async_trait]
impl CatalogSource for OmdbSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Omdb
    }

    async fn fetch(&self, http: &mut HttpFetcher<'_>, sink: RecordSink) -> Result<(), FetchError> {
        info!(
            "🍿 OMDb: {} queries, {} pages each",
            self.config.queries.len(),
            self.config.page_limit
        );
        let endpoint = format!("{}/", self.config.api_base.trim_end_matches('/'));

        for query in &self.config.queries {
            for page in 1..=self.config.page_limit {
                let what = format!("search '{}' page {}", query, page);
                let params = [
                    ("apikey", self.api_key.clone()),
                    ("s", query.clone()),
                    ("page", page.to_string()),
                ];

                let body = match http.get_text_with_query(&endpoint, &params).await {
                    Ok(body) => body,
                    Err(FetchError::Status { status: 401, .. }) => {
                        return Err(FetchError::Config("OMDb rejected the API key".to_string()));
                    }
                    Err(e) => match http.skip_unless_fatal(&what, e) {
                        Some(fatal) => return Err(fatal),
                        None => continue,
                    },
                };

                let page_result = match parse_search(&body, &self.config.title_base) {
                    Ok(page_result) => page_result,
                    Err(e) => {
                        warn!(source = %self.tag(), "Skipping {}: {}", what, e);
                        continue;
                    }
                };
                if page_result.rejects_key() {
                    return Err(FetchError::Config("OMDb rejected the API key".to_string()));
                }
                if let Some(message) = &page_result.error {
                    // "Movie not found!" past the last page
                    debug!(source = %self.tag(), "{}: {}", what, message);
                    break;
                }
                log_page(self.tag(), &what, page_result.records.len());

                for record in page_result.records {
                    if !sink.send(record).await {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

/// Records from one search response
///
/// `Year` is kept as text ("2008–2013" for series) and parsed during normalization.
pub fn parse_search(body: &str, title_base: &str) -> Result<SearchPage, ParseError> {
    let response: SearchResponse = serde_json::from_str(body)?;
    if response.response.as_deref() == Some("False") {
        return Ok(SearchPage {
            records: Vec::new(),
            error: Some(response.error.unwrap_or_else(|| "no results".to_string())),
        });
    }

    let entries = response.search.ok_or(ParseError::MissingField("Search"))?;
    let title_base = title_base.trim_end_matches('/');
    let records = entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.filter(|t| !t.trim().is_empty())?;
            let media_type = match entry.kind.as_deref() {
                Some("series") => MediaType::Series,
                _ => MediaType::Movie,
            };
            let imdb_id = entry.imdb_id.filter(|id| !id.trim().is_empty());

            Some(RawRecord {
                title,
                media_type: Some(media_type),
                year_text: entry.year,
                detail_url: imdb_id.as_ref().map(|id| format!("{}/{}/", title_base, id)),
                external_id: imdb_id,
                ..RawRecord::default()
            })
        })
        .collect();

    Ok(SearchPage { records, error: None })
}
