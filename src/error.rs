//! Error taxonomy for the ingestion engine
//!
//! Each layer has its own error type so the orchestrator can decide what to do with a
//! failure: skip one record, fail one source, or stop merging altogether.

/// Failure reaching a source over the network
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The source could not be reached at all (connection refused, DNS failure)
    #[error("source unreachable: {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Source configuration error: {0}")]
    Config(String),
}

impl FetchError {
    /// Whether this error means the whole source is down rather than one page
    pub fn is_source_level(&self) -> bool {
        matches!(self, FetchError::Unreachable { .. } | FetchError::Config(_))
    }

    /// Classify a transport error: connect failures take the whole source down
    pub fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_connect() {
            FetchError::Unreachable {
                url: url.to_string(),
                source: err,
            }
        } else {
            FetchError::Http(err)
        }
    }
}

/// A single page or record could not be interpreted
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("HTML parse error: {0}")]
    Html(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// A normalized candidate failed basic sanity checks
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title is empty after normalization")]
    EmptyTitle,
}

/// Persistence failure in the catalog store
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("title already exists for key {0}")]
    Conflict(String),

    #[error("title {0} not found")]
    NotFound(i64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by a refresh trigger
///
/// Single-source failures never show up here; they are reported in the cycle summary.
#[derive(thiserror::Error, Debug)]
pub enum RefreshError {
    #[error("a refresh cycle is already running")]
    AlreadyRunning,

    #[error("catalog store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The task running the cycle panicked or was cancelled
    #[error("refresh task ended abnormally: {0}")]
    Interrupted(String),
}
