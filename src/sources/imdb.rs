//! IMDb search/detail adapter
//!
//! Each configured query goes to the public suggestion endpoint; every `tt` hit can then
//! be enriched from the JSON-LD block of its title page.
use super::{log_page, CatalogSource, HttpFetcher, RawRecord, RecordSink};
use crate::catalog::SourceTag;
use crate::config::ImdbSourceConfig;
use crate::error::{FetchError, ParseError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct SuggestionResponse {
    #[serde(default)]
    d: Vec<Suggestion>,
}

/// One entry of the suggestion endpoint's `d` array
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Suggestion {
    pub id: Option<String>,
    /// Display title
    pub l: Option<String>,
    /// Type label, e.g. "feature" or "TV series"
    pub q: Option<String>,
    /// Start year
    pub y: Option<i32>,
}

/// Fields read from a title page's JSON-LD
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleDetails {
    pub description: Option<String>,
    pub date_published: Option<String>,
    pub rating: Option<String>,
}

pub struct ImdbSource {
    config: ImdbSourceConfig,
}

impl ImdbSource {
    pub fn new(config: ImdbSourceConfig) -> Self {
        Self { config }
    }

    fn title_url(&self, id: &str) -> String {
        format!("{}/{}/", self.config.title_base.trim_end_matches('/'), id)
    }

    async fn fetch_details(&self, http: &mut HttpFetcher<'_>, url: &str) -> Option<TitleDetails> {
        match http.get_text(url).await {
            Ok(html) => parse_title_details(&html),
            Err(e) => {
                debug!("No IMDb details from {}: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl CatalogSource for ImdbSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Imdb
    }

    async fn fetch(&self, http: &mut HttpFetcher<'_>, sink: RecordSink) -> Result<(), FetchError> {
        info!("🔎 IMDb: {} queries", self.config.queries.len());

        for query in &self.config.queries {
            let Some(url) = suggestion_url(&self.config.suggest_base, query) else {
                continue;
            };

            let body = match http.get_text(&url).await {
                Ok(body) => body,
                Err(e) => match http.skip_unless_fatal(&url, e) {
                    Some(fatal) => return Err(fatal),
                    None => continue,
                },
            };

            let suggestions = match parse_suggestions(&body, self.config.limit) {
                Ok(suggestions) => suggestions,
                Err(e) => {
                    warn!(source = %self.tag(), "Skipping suggestions for '{}': {}", query, e);
                    continue;
                }
            };
            log_page(self.tag(), &url, suggestions.len());

            for suggestion in suggestions {
                let Some(id) = suggestion.id else { continue };
                let title_url = self.title_url(&id);

                let details = if self.config.fetch_details {
                    self.fetch_details(http, &title_url).await.unwrap_or_default()
                } else {
                    TitleDetails::default()
                };

                let record = RawRecord {
                    title: suggestion.l.unwrap_or_default(),
                    media_hint: suggestion.q,
                    year: suggestion.y,
                    description: details.description,
                    release_date: details.date_published,
                    rating: details.rating,
                    detail_url: Some(title_url),
                    external_id: Some(id),
                    ..RawRecord::default()
                };
                if !sink.send(record).await {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

/// `{base}/{first letter}/{query}.json`
pub fn suggestion_url(base: &str, query: &str) -> Option<String> {
    let query = query.trim();
    let first = query.chars().next()?.to_lowercase().to_string();
    Some(format!(
        "{}/{}/{}.json",
        base.trim_end_matches('/'),
        urlencoding::encode(&first),
        urlencoding::encode(query)
    ))
}

/// Title hits (`tt…` ids) from a suggestion response, capped at `limit`
pub fn parse_suggestions(body: &str, limit: usize) -> Result<Vec<Suggestion>, ParseError> {
    let response: SuggestionResponse = serde_json::from_str(body)?;
    Ok(response
        .d
        .into_iter()
        .filter(|s| s.id.as_deref().map_or(false, |id| id.starts_with("tt")))
        .take(limit)
        .collect())
}

fn is_title_type(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "Movie" || t == "TVSeries",
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| matches!(t.as_str(), Some("Movie") | Some("TVSeries"))),
        _ => false,
    }
}

fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read the first Movie/TVSeries JSON-LD block of a title page
pub fn parse_title_details(html: &str) -> Option<TitleDetails> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    for script in document.select(&selector) {
        let payload = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(&payload) else {
            continue;
        };
        if !is_title_type(&value) {
            continue;
        }
        return Some(TitleDetails {
            description: value_text(value.get("description")),
            date_published: value_text(value.get("datePublished")),
            rating: value_text(value.get("aggregateRating").and_then(|r| r.get("ratingValue"))),
        });
    }

    None
}
