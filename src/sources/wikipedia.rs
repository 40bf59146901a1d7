//! Wikipedia list-page adapter
//!
//! Crawls "List of American films/television series of YEAR" pages from the current
//! year down to a configured minimum, then a fixed set of collection pages without year
//! context. Titles come from `wikitable` rows; optional per-title summaries come from the
//! REST summary endpoint.
use super::{log_page, CatalogSource, HttpFetcher, RawRecord, RecordSink};
use crate::catalog::{MediaType, SourceTag};
use crate::config::WikipediaSourceConfig;
use crate::error::{FetchError, ParseError};
use async_trait::async_trait;
use chrono::Datelike;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

/// One list page to crawl
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub url: String,
    pub year: Option<i32>,
    pub media_type: MediaType,
}

/// A parsed table row plus the article slug its title links to
#[derive(Debug, Clone, PartialEq)]
pub struct WikiEntry {
    pub record: RawRecord,
    pub slug: Option<String>,
}

pub struct WikipediaSource {
    config: WikipediaSourceConfig,
    min_year: i32,
}

impl WikipediaSource {
    pub fn new(config: WikipediaSourceConfig, min_year: i32) -> Self {
        Self { config, min_year }
    }

    async fn fetch_summary(&self, http: &mut HttpFetcher<'_>, slug: &str) -> Option<String> {
        let url = format!("{}/page/summary/{}", self.config.api_base.trim_end_matches('/'), slug);
        match http.get_text(&url).await {
            Ok(body) => parse_summary(&body),
            Err(e) => {
                debug!("No summary for {}: {}", slug, e);
                None
            }
        }
    }
}

#[async_trait]
impl CatalogSource for WikipediaSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Wikipedia
    }

    async fn fetch(&self, http: &mut HttpFetcher<'_>, sink: RecordSink) -> Result<(), FetchError> {
        let current_year = chrono::Utc::now().year();
        let pages = list_pages(&self.config, self.min_year, current_year);
        info!("📚 Wikipedia: {} list pages to crawl", pages.len());

        for page in pages {
            let html = match http.get_text(&page.url).await {
                Ok(html) => html,
                Err(e) => match http.skip_unless_fatal(&page.url, e) {
                    Some(fatal) => return Err(fatal),
                    None => continue,
                },
            };

            let entries = match parse_list_page(&html, &page, &self.config.wiki_base, self.config.tables_per_page) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(source = %self.tag(), "Skipping unparseable page {}: {}", page.url, e);
                    continue;
                }
            };
            log_page(self.tag(), &page.url, entries.len());

            for entry in entries {
                let mut record = entry.record;
                if self.config.fetch_summaries {
                    if let Some(slug) = entry.slug.as_deref() {
                        if let Some(summary) = self.fetch_summary(http, slug).await {
                            record.description = Some(summary);
                        }
                    }
                }
                if !sink.send(record).await {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

/// Year pages newest first, then collection pages
pub fn list_pages(config: &WikipediaSourceConfig, min_year: i32, current_year: i32) -> Vec<ListPage> {
    let base = config.wiki_base.trim_end_matches('/');
    let mut pages = Vec::new();

    for year in (min_year..=current_year).rev() {
        pages.push(ListPage {
            url: format!("{}/List_of_American_films_of_{}", base, year),
            year: Some(year),
            media_type: MediaType::Movie,
        });
        pages.push(ListPage {
            url: format!("{}/List_of_American_television_series_of_{}", base, year),
            year: Some(year),
            media_type: MediaType::Series,
        });
    }

    for collection in &config.collections {
        pages.push(ListPage {
            url: format!("{}/{}", base, collection.page),
            year: None,
            media_type: collection.media_type,
        });
    }

    pages
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Html(format!("bad selector {}: {:?}", css, e)))
}

fn normalize_header(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Visible text of an element, minus footnote superscripts
fn element_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map_or(false, |e| matches!(e.name(), "sup" | "style" | "script"))
            });
            if !hidden {
                parts.push(text);
            }
        }
    }
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn column_value(headers: &[String], cells: &[String], matches: impl Fn(&str) -> bool) -> Option<String> {
    headers
        .iter()
        .position(|h| matches(h))
        .and_then(|idx| cells.get(idx))
        .filter(|text| !text.is_empty())
        .cloned()
}

fn wiki_slug(href: &str) -> Option<String> {
    let slug = href.strip_prefix("/wiki/")?;
    let slug = slug.split('#').next().unwrap_or(slug);
    if slug.is_empty() || slug.starts_with("File:") {
        return None;
    }
    Some(slug.to_string())
}

/// Extract title rows from the first `tables_per_page` wikitables of a list page
pub fn parse_list_page(
    html: &str,
    page: &ListPage,
    wiki_base: &str,
    tables_per_page: usize,
) -> Result<Vec<WikiEntry>, ParseError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table.wikitable")?;
    let row_selector = selector("tr")?;
    let italic_selector = selector("i")?;
    let link_selector = selector("a[href]")?;

    let mut entries = Vec::new();

    for table in document.select(&table_selector).take(tables_per_page) {
        let mut headers: Vec<String> = Vec::new();

        for row in table.select(&row_selector) {
            let cells: Vec<ElementRef> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .collect();
            if cells.is_empty() {
                continue;
            }

            if !cells.iter().any(|c| c.value().name() == "td") {
                if headers.is_empty() {
                    headers = cells.iter().map(|c| normalize_header(&element_text(*c))).collect();
                }
                continue;
            }

            // Film titles are italicized; fall back to the first cell for plain tables
            let italic = cells.iter().find_map(|c| c.select(&italic_selector).next());
            let title_element = italic.unwrap_or(cells[0]);
            let title = element_text(title_element);
            if title.is_empty() {
                continue;
            }

            let slug = title_element
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(wiki_slug);

            let texts: Vec<String> = cells.iter().map(|c| element_text(*c)).collect();
            let detail_url = match &slug {
                Some(slug) => format!("{}/{}", wiki_base.trim_end_matches('/'), slug),
                None => page.url.clone(),
            };

            let record = RawRecord {
                title,
                media_type: Some(page.media_type),
                year: page.year,
                year_text: column_value(&headers, &texts, |h| h == "year" || h.starts_with("year ")),
                description: column_value(&headers, &texts, |h| h.contains("notes") || h.contains("description")),
                release_date: column_value(&headers, &texts, |h| {
                    h.contains("release date") || h.contains("first aired") || h.contains("release")
                }),
                rating: column_value(&headers, &texts, |h| h.contains("rating")),
                detail_url: Some(detail_url),
                ..RawRecord::default()
            };
            entries.push(WikiEntry { record, slug });
        }
    }

    Ok(entries)
}

/// `extract` field of a page summary response
pub fn parse_summary(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("extract")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
