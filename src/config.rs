use anyhow::{anyhow, Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::MediaType;
use crate::ingest::normalize::{MAX_VALID_YEAR, MIN_VALID_YEAR};

/// Shortest interval the scheduler will honor between refresh cycles
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Longest accepted `refresh.interval_hours` (one year)
pub const MAX_REFRESH_INTERVAL_HOURS: f64 = 24.0 * 365.0;

/// Configuration for the catalog ingestion engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog storage settings
    pub catalog: CatalogConfig,

    /// Refresh cycle and scheduling settings
    pub refresh: RefreshConfig,

    /// Outbound HTTP client settings
    pub http: HttpConfig,

    /// Log output settings
    pub logging: LoggingConfig,

    /// HTTP trigger surface settings
    pub server: ServerConfig,

    /// Per-source settings
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite database file
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Hours between scheduled cycles
    pub interval_hours: f64,

    /// Oldest year whose list pages are crawled
    pub min_year: i32,

    /// Records buffered between a source and the merge writer
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub wikipedia: WikipediaSourceConfig,
    pub imdb: ImdbSourceConfig,
    pub tvmaze: TvmazeSourceConfig,
    pub tmdb: TmdbSourceConfig,
    pub omdb: OmdbSourceConfig,
}

/// A list page crawled without year context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionPage {
    /// Article name under the wiki base, e.g. `List_of_highest-grossing_films`
    pub page: String,
    pub media_type: MediaType,
}

impl CollectionPage {
    fn new(page: &str, media_type: MediaType) -> Self {
        Self {
            page: page.to_string(),
            media_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikipediaSourceConfig {
    pub enabled: bool,

    /// Base for article URLs
    pub wiki_base: String,

    /// Base for the REST API (page summaries)
    pub api_base: String,

    /// Only the first N `wikitable` tables of a page are read
    pub tables_per_page: usize,

    /// Look up each linked title's summary extract
    pub fetch_summaries: bool,

    /// Minimum gap between requests, in milliseconds
    pub request_delay_ms: u64,

    pub collections: Vec<CollectionPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImdbSourceConfig {
    pub enabled: bool,

    /// Search terms sent to the suggestion endpoint
    pub queries: Vec<String>,

    /// Suggestions kept per query
    pub limit: usize,

    /// Fetch each title page for description, date and rating
    pub fetch_details: bool,

    pub request_delay_ms: u64,
    pub suggest_base: String,
    pub title_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TvmazeSourceConfig {
    pub enabled: bool,
    pub page_limit: u32,
    pub request_delay_ms: u64,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmdbSourceConfig {
    pub enabled: bool,

    /// Without a key the source is skipped
    pub api_key: Option<String>,

    pub page_limit: u32,
    pub request_delay_ms: u64,
    pub api_base: String,

    /// Base for the public title pages recorded as source URLs
    pub site_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OmdbSourceConfig {
    pub enabled: bool,

    /// Without a key the source is skipped
    pub api_key: Option<String>,

    /// Search terms, each paged through `page_limit` result pages
    pub queries: Vec<String>,

    pub page_limit: u32,
    pub request_delay_ms: u64,
    pub api_base: String,

    /// Base for the IMDb title pages recorded as source URLs
    pub title_base: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/catalog.db"),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_hours: 12.0,
            min_year: chrono::Utc::now().year() - 1,
            channel_capacity: 64,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("catalog-engine/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for WikipediaSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wiki_base: "https://en.wikipedia.org/wiki".to_string(),
            api_base: "https://en.wikipedia.org/api/rest_v1".to_string(),
            tables_per_page: 2,
            fetch_summaries: true,
            request_delay_ms: 0,
            collections: vec![
                CollectionPage::new("List_of_highest-grossing_films", MediaType::Movie),
                CollectionPage::new("List_of_highest-grossing_films_in_the_United_States", MediaType::Movie),
                CollectionPage::new("List_of_highest-grossing_animated_films", MediaType::Movie),
                CollectionPage::new("List_of_highest-grossing_films_by_year", MediaType::Movie),
                CollectionPage::new("List_of_animated_television_series", MediaType::Series),
                CollectionPage::new("List_of_drama_television_series", MediaType::Series),
                CollectionPage::new("List_of_comedy_television_series", MediaType::Series),
            ],
        }
    }
}

impl Default for ImdbSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queries: vec!["star".to_string(), "night".to_string()],
            limit: 20,
            fetch_details: true,
            request_delay_ms: 0,
            suggest_base: "https://v2.sg.media-imdb.com/suggestion".to_string(),
            title_base: "https://www.imdb.com/title".to_string(),
        }
    }
}

impl Default for TvmazeSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_limit: 2,
            request_delay_ms: 0,
            api_base: "https://api.tvmaze.com".to_string(),
        }
    }
}

impl Default for TmdbSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            page_limit: 2,
            request_delay_ms: 0,
            api_base: "https://api.themoviedb.org/3".to_string(),
            site_base: "https://www.themoviedb.org".to_string(),
        }
    }
}

impl Default for OmdbSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            queries: vec!["star".to_string(), "night".to_string()],
            page_limit: 2,
            request_delay_ms: 0,
            api_base: "https://www.omdbapi.com".to_string(),
            title_base: "https://www.imdb.com/title".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            refresh: RefreshConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env_var(name).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn env_flag(name: &str) -> Option<bool> {
    env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_var(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}: cannot parse '{}'", name, raw);
            None
        }
    }
}

/// Delay given in (possibly fractional) seconds, as milliseconds
fn env_delay_ms(name: &str) -> Option<u64> {
    env_parse::<f64>(name)
        .filter(|secs| *secs >= 0.0)
        .map(|secs| (secs * 1000.0).round() as u64)
}

impl Config {
    /// Default file locations, checked in order
    pub const SEARCH_PATHS: [&'static str; 2] = ["catalog-engine.toml", "config/catalog-engine.toml"];

    /// Load configuration: explicit file, else the first default location found, else
    /// defaults. Environment overrides apply on top in every case.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_search_paths(),
        };
        config.apply_env();
        Ok(config)
    }

    fn from_search_paths() -> Self {
        for path in &Self::SEARCH_PATHS {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config = toml::from_str(&config_str)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply deployment environment variables over the current values
    pub fn apply_env(&mut self) {
        if let Some(path) = env_var("CATALOG_DB_PATH") {
            self.catalog.database_path = PathBuf::from(path);
        }
        if let Some(year) = env_parse("CATALOG_MIN_YEAR") {
            self.refresh.min_year = year;
        }
        if let Some(hours) = env_parse("CATALOG_REFRESH_INTERVAL_HOURS") {
            self.refresh.interval_hours = hours;
        }
        if let Some(level) = env_var("CATALOG_LOG_LEVEL") {
            self.logging.level = level;
        }

        let wiki = &mut self.sources.wikipedia;
        if let Some(enabled) = env_flag("CATALOG_ENABLE_WIKIPEDIA") {
            wiki.enabled = enabled;
        }
        if let Some(fetch) = env_flag("CATALOG_FETCH_SUMMARIES") {
            wiki.fetch_summaries = fetch;
        }
        if let Some(delay) = env_delay_ms("CATALOG_WIKI_SUMMARY_DELAY_SECONDS") {
            wiki.request_delay_ms = delay;
        }

        let imdb = &mut self.sources.imdb;
        if let Some(enabled) = env_flag("CATALOG_ENABLE_IMDB") {
            imdb.enabled = enabled;
        }
        if let Some(queries) = env_list("CATALOG_IMDB_QUERIES") {
            imdb.queries = queries;
        }
        if let Some(limit) = env_parse("CATALOG_IMDB_LIMIT") {
            imdb.limit = limit;
        }
        if let Some(delay) = env_delay_ms("CATALOG_IMDB_DETAIL_DELAY_SECONDS") {
            imdb.request_delay_ms = delay;
        }

        if let Some(delay) = env_delay_ms("CATALOG_PAGE_DELAY_SECONDS") {
            self.sources.tvmaze.request_delay_ms = delay;
            self.sources.tmdb.request_delay_ms = delay;
            self.sources.omdb.request_delay_ms = delay;
        }
        if let Some(enabled) = env_flag("TVMAZE_ENABLED") {
            self.sources.tvmaze.enabled = enabled;
        }
        if let Some(pages) = env_parse("TVMAZE_PAGE_LIMIT") {
            self.sources.tvmaze.page_limit = pages;
        }
        if let Some(key) = env_var("TMDB_API_KEY") {
            self.sources.tmdb.api_key = Some(key);
        }
        if let Some(pages) = env_parse("TMDB_PAGE_LIMIT") {
            self.sources.tmdb.page_limit = pages;
        }
        if let Some(key) = env_var("OMDB_API_KEY") {
            self.sources.omdb.api_key = Some(key);
        }
        if let Some(queries) = env_list("OMDB_QUERIES") {
            self.sources.omdb.queries = queries;
        }
        if let Some(pages) = env_parse("OMDB_PAGE_LIMIT") {
            self.sources.omdb.page_limit = pages;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)
            .with_context(|| format!("Cannot write config file {}", path.display()))?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.refresh.interval_hours <= 0.0 || !self.refresh.interval_hours.is_finite() {
            return Err(anyhow!("refresh.interval_hours must be greater than 0"));
        }
        if self.refresh.interval_hours > MAX_REFRESH_INTERVAL_HOURS {
            return Err(anyhow!(
                "refresh.interval_hours must be at most {}",
                MAX_REFRESH_INTERVAL_HOURS
            ));
        }

        if !(MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&self.refresh.min_year) {
            return Err(anyhow!(
                "refresh.min_year must be between {} and {}",
                MIN_VALID_YEAR,
                MAX_VALID_YEAR
            ));
        }

        if self.refresh.channel_capacity == 0 {
            return Err(anyhow!("refresh.channel_capacity must be greater than 0"));
        }

        if self.http.timeout_seconds == 0 {
            return Err(anyhow!("http.timeout_seconds must be greater than 0"));
        }

        if self.sources.wikipedia.tables_per_page == 0 {
            return Err(anyhow!("sources.wikipedia.tables_per_page must be greater than 0"));
        }

        if self.sources.imdb.limit == 0 {
            return Err(anyhow!("sources.imdb.limit must be greater than 0"));
        }

        if self.sources.tvmaze.page_limit == 0
            || self.sources.tmdb.page_limit == 0
            || self.sources.omdb.page_limit == 0
        {
            return Err(anyhow!("source page limits must be greater than 0"));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Interval between scheduled cycles, clamped to the accepted range
    pub fn refresh_interval(&self) -> Duration {
        let hours = if self.refresh.interval_hours.is_nan() {
            0.0
        } else {
            self.refresh.interval_hours.clamp(0.0, MAX_REFRESH_INTERVAL_HOURS)
        };
        Duration::try_from_secs_f64(hours * 3600.0)
            .unwrap_or(MIN_REFRESH_INTERVAL)
            .max(MIN_REFRESH_INTERVAL)
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        let src = &self.sources;
        format!(
            "Catalog Engine Configuration:\n\
            - Database: {}\n\
            - Refresh Interval: {}h\n\
            - Min Year: {}\n\
            - Wikipedia: {} (summaries: {})\n\
            - IMDb: {} (queries: {})\n\
            - TVMaze: {} ({} pages)\n\
            - TMDB: {}\n\
            - OMDb: {} (queries: {})",
            self.catalog.database_path.display(),
            self.refresh.interval_hours,
            self.refresh.min_year,
            src.wikipedia.enabled,
            src.wikipedia.fetch_summaries,
            src.imdb.enabled,
            src.imdb.queries.join(", "),
            src.tvmaze.enabled,
            src.tvmaze.page_limit,
            match (&src.tmdb.api_key, src.tmdb.enabled) {
                (Some(_), true) => "enabled",
                (None, true) => "no api key",
                _ => "disabled",
            },
            match (&src.omdb.api_key, src.omdb.enabled) {
                (Some(_), true) => "enabled",
                (None, true) => "no api key",
                _ => "disabled",
            },
            src.omdb.queries.join(", ")
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.config.catalog.database_path = path;
        self
    }

    pub fn with_min_year(mut self, year: i32) -> Self {
        self.config.refresh.min_year = year;
        self
    }

    pub fn with_interval_hours(mut self, hours: f64) -> Self {
        self.config.refresh.interval_hours = hours;
        self
    }

    pub fn with_imdb_queries(mut self, queries: Vec<String>) -> Self {
        self.config.sources.imdb.queries = queries;
        self
    }

    pub fn with_tmdb_api_key(mut self, key: String) -> Self {
        self.config.sources.tmdb.api_key = Some(key);
        self
    }

    pub fn with_omdb_api_key(mut self, key: String) -> Self {
        self.config.sources.omdb.api_key = Some(key);
        self
    }

    pub fn enable_wikipedia(mut self, enable: bool) -> Self {
        self.config.sources.wikipedia.enabled = enable;
        self
    }

    pub fn enable_imdb(mut self, enable: bool) -> Self {
        self.config.sources.imdb.enabled = enable;
        self
    }

    pub fn enable_tvmaze(mut self, enable: bool) -> Self {
        self.config.sources.tvmaze.enabled = enable;
        self
    }

    pub fn enable_tmdb(mut self, enable: bool) -> Self {
        self.config.sources.tmdb.enabled = enable;
        self
    }

    pub fn enable_omdb(mut self, enable: bool) -> Self {
        self.config.sources.omdb.enabled = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.refresh.interval_hours, 12.0);
        assert_eq!(config.refresh.min_year, chrono::Utc::now().year() - 1);
        assert_eq!(config.sources.wikipedia.tables_per_page, 2);
        assert_eq!(config.sources.imdb.queries, vec!["star", "night"]);
        assert!(config.sources.tmdb.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_min_year(2020)
            .with_interval_hours(6.0)
            .enable_imdb(false)
            .with_tmdb_api_key("abc".to_string())
            .build();

        assert_eq!(config.refresh.min_year, 2020);
        assert_eq!(config.refresh.interval_hours, 6.0);
        assert!(!config.sources.imdb.enabled);
        assert_eq!(config.sources.tmdb.api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let config = ConfigBuilder::new().with_interval_hours(0.0).build();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sources.imdb.limit = 0;
        assert!(config.validate().is_err());

        let config = ConfigBuilder::new().with_min_year(1200).build();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sources.omdb.page_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_interval_is_rejected_and_never_panics() {
        let config = ConfigBuilder::new().with_interval_hours(1e300).build();
        assert!(config.validate().is_err());
        assert_eq!(
            config.refresh_interval(),
            Duration::from_secs_f64(MAX_REFRESH_INTERVAL_HOURS * 3600.0)
        );

        let config = ConfigBuilder::new().with_interval_hours(MAX_REFRESH_INTERVAL_HOURS).build();
        assert!(config.validate().is_ok());

        let config = ConfigBuilder::new().with_interval_hours(f64::NAN).build();
        assert!(config.validate().is_err());
        assert_eq!(config.refresh_interval(), MIN_REFRESH_INTERVAL);
    }

    #[test]
    fn test_refresh_interval_has_floor() {
        let config = ConfigBuilder::new().with_interval_hours(0.01).build();
        assert_eq!(config.refresh_interval(), MIN_REFRESH_INTERVAL);

        let config = ConfigBuilder::new().with_interval_hours(2.0).build();
        assert_eq!(config.refresh_interval(), Duration::from_secs(7200));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog-engine.toml");
        std::fs::write(
            &path,
            r#"
[refresh]
min_year = 2019

[sources.tmdb]
api_key = "secret"
page_limit = 5

[[sources.wikipedia.collections]]
page = "List_of_science_fiction_films"
media_type = "movie"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.refresh.min_year, 2019);
        assert_eq!(config.refresh.interval_hours, 12.0);
        assert_eq!(config.sources.tmdb.page_limit, 5);
        assert_eq!(config.sources.tmdb.api_key.as_deref(), Some("secret"));
        assert_eq!(
            config.sources.wikipedia.collections,
            vec![CollectionPage::new("List_of_science_fiction_films", MediaType::Movie)]
        );
        assert!(config.sources.tvmaze.enabled);
        assert!(config.sources.omdb.api_key.is_none());
        assert_eq!(config.sources.omdb.page_limit, 2);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let config = ConfigBuilder::new().with_min_year(2015).build();
        config.save(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.refresh.min_year, 2015);
        assert_eq!(reloaded.sources.wikipedia.collections.len(), 7);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
