//! Raw record → candidate normalization
//!
//! Everything here is pure: no I/O, no clock reads. Sources differ wildly in how they
//! spell titles, dates and ratings, so each field gets its own small parser.

use crate::catalog::{Candidate, MediaType, SourceTag};
use crate::error::ValidationError;
use crate::sources::RawRecord;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

/// Earliest year accepted as a real release year
pub const MIN_VALID_YEAR: i32 = 1870;
/// Latest year accepted as a real release year
pub const MAX_VALID_YEAR: i32 = 2100;

static FOOTNOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]{0,12}\]").expect("footnote regex should compile"));
static TRAILING_MARKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s†‡§#*]+$").expect("trailing marks regex should compile"));
static TITLE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<name>.*?)\s*\(\s*(?P<year>\d{4})?\s*(?P<kind>film|movie|tv series|tv miniseries|miniseries|tv program|tv programme|series)?\s*\)$",
    )
    .expect("title suffix regex should compile")
});
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("year regex should compile"));
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex should compile"));
static DENOMINATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\s*(\d+)").expect("denominator regex should compile"));

/// Scale a source reports ratings on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatingScale {
    /// 0–10, stored as is
    TenPoint,
    /// 0–5 stars, doubled
    FivePoint,
    /// 0–100 percent, divided by ten
    Percent,
}

impl RatingScale {
    fn from_denominator(denominator: u32) -> Option<Self> {
        match denominator {
            5 => Some(RatingScale::FivePoint),
            10 => Some(RatingScale::TenPoint),
            100 => Some(RatingScale::Percent),
            _ => None,
        }
    }

    fn to_ten_point(self, value: f64) -> f64 {
        match self {
            RatingScale::TenPoint => value,
            RatingScale::FivePoint => value * 2.0,
            RatingScale::Percent => value / 10.0,
        }
    }
}

/// Native rating scale of each source
pub fn source_rating_scale(source: SourceTag) -> RatingScale {
    match source {
        SourceTag::Wikipedia
        | SourceTag::Imdb
        | SourceTag::Tvmaze
        | SourceTag::Tmdb
        | SourceTag::Omdb
        | SourceTag::Unknown => RatingScale::TenPoint,
    }
}

/// Map a raw record into the canonical candidate shape
pub fn normalize(raw: RawRecord, source: SourceTag) -> Result<Candidate, ValidationError> {
    let cleaned = clean_title(&raw.title);
    let split = split_title_suffix(&cleaned);
    if split.name.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }

    let media_type = infer_media_type(raw.media_type, raw.media_hint.as_deref(), split.kind);

    let explicit_year = raw
        .year
        .or_else(|| raw.year_text.as_deref().and_then(parse_year))
        .filter(|y| valid_year(*y));
    let context_year = explicit_year.or(split.year);
    let release_date = raw
        .release_date
        .as_deref()
        .and_then(|text| parse_release_date(text, context_year));
    let year = context_year.or_else(|| release_date.map(|d| d.year()).filter(|y| valid_year(*y)));

    Ok(Candidate {
        title: split.name,
        media_type,
        year,
        description: raw.description.as_deref().and_then(clean_text),
        release_date,
        rating: raw
            .rating
            .as_deref()
            .and_then(|text| parse_rating(text, source_rating_scale(source))),
        source,
        source_url: raw.detail_url.as_deref().and_then(clean_text),
        external_id: raw.external_id.as_deref().and_then(clean_text),
    })
}

/// Collapse whitespace and drop footnote markers, keeping original casing
pub fn clean_title(title: &str) -> String {
    let without_refs = FOOTNOTE.replace_all(title, "");
    let collapsed = without_refs.split_whitespace().collect::<Vec<_>>().join(" ");
    TRAILING_MARKS.replace(&collapsed, "").trim().to_string()
}

fn clean_text(text: &str) -> Option<String> {
    let without_refs = FOOTNOTE.replace_all(text, "");
    let collapsed = without_refs.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Kind marker found in a trailing title parenthetical
#[derive(Debug, Clone, Copy, PartialEq)]
enum TitleKind {
    Film,
    Series,
}

struct SplitTitle {
    name: String,
    year: Option<i32>,
    kind: Option<TitleKind>,
}

/// Strip a trailing "(2016)", "(2014 TV series)", "(film)" style parenthetical
fn split_title_suffix(title: &str) -> SplitTitle {
    if let Some(caps) = TITLE_SUFFIX.captures(title) {
        let year = caps.name("year").and_then(|m| m.as_str().parse::<i32>().ok());
        let kind = caps.name("kind").map(|m| {
            let kind = m.as_str().to_lowercase();
            if kind == "film" || kind == "movie" {
                TitleKind::Film
            } else {
                TitleKind::Series
            }
        });
        let name = caps.name("name").map(|m| m.as_str().trim()).unwrap_or("");
        if (year.is_some() || kind.is_some()) && !name.is_empty() {
            return SplitTitle {
                name: name.to_string(),
                year: year.filter(|y| valid_year(*y)),
                kind,
            };
        }
    }

    SplitTitle {
        name: title.to_string(),
        year: None,
        kind: None,
    }
}

/// Media type from the strongest available signal, defaulting to movie
fn infer_media_type(explicit: Option<MediaType>, hint: Option<&str>, kind: Option<TitleKind>) -> MediaType {
    if let Some(media) = explicit {
        return media;
    }
    if let Some(media) = hint.and_then(classify_media_hint) {
        return media;
    }
    match kind {
        Some(TitleKind::Series) => MediaType::Series,
        _ => MediaType::Movie,
    }
}

/// Interpret free-text type hints such as "TV series", "feature" or "TV movie"
pub fn classify_media_hint(hint: &str) -> Option<MediaType> {
    let hint = hint.to_lowercase();
    if ["series", "miniseries", "show", "tvseries", "tvminiseries", "scripted", "reality"]
        .iter()
        .any(|marker| hint.contains(marker))
    {
        return Some(MediaType::Series);
    }
    if ["movie", "film", "feature", "special", "short"]
        .iter()
        .any(|marker| hint.contains(marker))
    {
        return Some(MediaType::Movie);
    }
    if hint.split(|c: char| !c.is_alphanumeric()).any(|word| word == "tv") {
        return Some(MediaType::Series);
    }
    None
}

fn valid_year(year: i32) -> bool {
    (MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&year)
}

/// First plausible four-digit year in the text
pub fn parse_year(text: &str) -> Option<i32> {
    YEAR.captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<i32>().ok()))
        .find(|y| valid_year(*y))
}

/// Parse a rating and convert it to the 0–10 scale
///
/// Percent signs and "/5" style denominators in the text override the source's scale.
/// Values outside 0–10 after conversion are rejected rather than clamped.
pub fn parse_rating(text: &str, scale: RatingScale) -> Option<f64> {
    let value: f64 = NUMBER.find(text)?.as_str().parse().ok()?;
    let scale = if text.contains('%') {
        RatingScale::Percent
    } else {
        DENOMINATOR
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .and_then(RatingScale::from_denominator)
            .unwrap_or(scale)
    };

    let rating = scale.to_ten_point(value);
    if rating.is_finite() && (0.0..=10.0).contains(&rating) {
        Some((rating * 100.0).round() / 100.0)
    } else {
        None
    }
}

const FULL_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y", "%B %d %Y"];
const MONTH_DAY_FORMATS: &[&str] = &["%B %d %Y", "%b %d %Y", "%d %B %Y"];

/// Parse a release date; month-day forms borrow the record's year
pub fn parse_release_date(text: &str, year: Option<i32>) -> Option<NaiveDate> {
    let text = FOOTNOTE.replace_all(text, "");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }

    // "2016-11-11T00:00:00Z" and similar
    let date_part = text.split('T').next().unwrap_or(&text);
    for format in FULL_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
        if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
            return Some(date);
        }
    }

    let year = year?;
    let with_year = format!("{} {}", text.trim_end_matches(','), year);
    MONTH_DAY_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&with_year, format).ok())
}
