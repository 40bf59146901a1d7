//! TVMaze show index adapter
use super::{log_page, CatalogSource, HttpFetcher, RawRecord, RecordSink};
use crate::catalog::{MediaType, SourceTag};
use crate::config::TvmazeSourceConfig;
use crate::error::{FetchError, ParseError};
use async_trait::async_trait;
use scraper::Html;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct Show {
    id: Option<i64>,
    name: Option<String>,
    url: Option<String>,
    premiered: Option<String>,
    summary: Option<String>,
    rating: Option<ShowRating>,
}

#[derive(Debug, Deserialize)]
struct ShowRating {
    average: Option<f64>,
}

pub struct TvmazeSource {
    config: TvmazeSourceConfig,
}

impl TvmazeSource {
    pub fn new(config: TvmazeSourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CatalogSource for TvmazeSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Tvmaze
    }

    async fn fetch(&self, http: &mut HttpFetcher<'_>, sink: RecordSink) -> Result<(), FetchError> {
        info!("📺 TVMaze: {} index pages", self.config.page_limit);
        let endpoint = format!("{}/shows", self.config.api_base.trim_end_matches('/'));

        for page in 0..self.config.page_limit {
            let body = match http.get_text_with_query(&endpoint, &[("page", page.to_string())]).await {
                Ok(body) => body,
                Err(e) => match http.skip_unless_fatal(&format!("shows page {}", page), e) {
                    Some(fatal) => return Err(fatal),
                    None => continue,
                },
            };

            let records = match parse_shows(&body) {
                Ok(records) => records,
                Err(e) => {
                    warn!(source = %self.tag(), "Skipping shows page {}: {}", page, e);
                    continue;
                }
            };
            log_page(self.tag(), &format!("shows page {}", page), records.len());

            for record in records {
                if !sink.send(record).await {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

/// Plain text of an HTML fragment such as a show summary
pub fn strip_html(fragment: &str) -> Option<String> {
    let text = Html::parse_fragment(fragment)
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Series records from one `/shows?page=N` response
pub fn parse_shows(body: &str) -> Result<Vec<RawRecord>, ParseError> {
    let shows: Vec<Show> = serde_json::from_str(body)?;
    Ok(shows
        .into_iter()
        .filter_map(|show| {
            let title = show.name.filter(|n| !n.trim().is_empty())?;
            Some(RawRecord {
                title,
                media_type: Some(MediaType::Series),
                year_text: show.premiered.clone(),
                release_date: show.premiered,
                description: show.summary.as_deref().and_then(strip_html),
                rating: show.rating.and_then(|r| r.average).map(|avg| avg.to_string()),
                detail_url: show.url,
                external_id: show.id.map(|id| id.to_string()),
                ..RawRecord::default()
            })
        })
        .collect())
}
