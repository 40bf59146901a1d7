//! Throttled HTTP access shared by all source adapters
use super::rate_limit::RateLimiter;
use crate::catalog::SourceTag;
use crate::config::HttpConfig;
use crate::error::FetchError;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Build the outbound client used for one refresh cycle
pub fn build_client(config: &HttpConfig) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(config.user_agent.as_str())
        .build()
        .unwrap_or_else(|e| {
            warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
}

/// HTTP client bound to one source's throttle
///
/// Every request waits on the rate limiter first, so an adapter cannot bypass its
/// politeness delay. One fetcher serves one source for one cycle.
pub struct HttpFetcher<'a> {
    client: Client,
    source: SourceTag,
    limiter: &'a mut RateLimiter,
    /// A request to this source has returned 2xx this cycle
    answered: bool,
}

impl<'a> HttpFetcher<'a> {
    pub fn new(client: Client, source: SourceTag, limiter: &'a mut RateLimiter) -> Self {
        Self {
            client,
            source,
            limiter,
            answered: false,
        }
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    /// GET a URL and return the body text
    ///
    /// Connection failures come back as `FetchError::Unreachable`; non-2xx responses as
    /// `FetchError::Status`.
    pub async fn get_text(&mut self, url: &str) -> Result<String, FetchError> {
        self.limiter.wait(self.source).await;
        // Query strings may carry API keys
        debug!("🌐 GET {}", url.split('?').next().unwrap_or(url));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        self.answered = true;
        Ok(response.text().await?)
    }

    /// Log and classify a failed page/item request
    ///
    /// Returns the error when it takes the whole source down; otherwise `None` so the
    /// caller can skip to the next page. A connect failure is source-level only while
    /// nothing has answered yet; after that it costs a single page.
    pub fn skip_unless_fatal(&self, what: &str, err: FetchError) -> Option<FetchError> {
        let fatal = match &err {
            FetchError::Unreachable { .. } => !self.answered,
            other => other.is_source_level(),
        };
        if fatal {
            Some(err)
        } else {
            warn!(source = %self.source, "Skipping {}: {}", what, err);
            None
        }
    }

    /// GET a URL with query parameters appended
    pub async fn get_text_with_query(&mut self, base: &str, params: &[(&str, String)]) -> Result<String, FetchError> {
        let url = Url::parse_with_params(base, params)
            .map_err(|e| FetchError::Config(format!("invalid URL {}: {}", base, e)))?;
        self.get_text(url.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let client = build_client(&HttpConfig {
            user_agent: "catalog-engine-test".to_string(),
            timeout_seconds: 5,
        });
        let mut limiter = RateLimiter::new();
        let mut http = HttpFetcher::new(client, SourceTag::Tvmaze, &mut limiter);

        let err = http.get_text("http://127.0.0.1:1/shows").await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { .. }), "got {:?}", err);
        assert!(err.is_source_level());
    }

    /// Serve a single `200 ok` response on an ephemeral port
    async fn serve_once() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                .await
                .unwrap();
        });
        format!("http://{}/page/1", addr)
    }

    #[tokio::test]
    async fn test_connect_failure_after_success_skips_one_page() {
        let mut limiter = RateLimiter::new();
        let mut http = HttpFetcher::new(Client::new(), SourceTag::Tvmaze, &mut limiter);

        let err = http.get_text("http://127.0.0.1:1/page/0").await.unwrap_err();
        assert!(http.skip_unless_fatal("page 0", err).is_some());

        let url = serve_once().await;
        assert_eq!(http.get_text(&url).await.unwrap(), "ok");

        let err = http.get_text("http://127.0.0.1:1/page/2").await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { .. }));
        assert!(http.skip_unless_fatal("page 2", err).is_none());

        let config = FetchError::Config("bad key".to_string());
        assert!(http.skip_unless_fatal("page 3", config).is_some());
    }

    #[tokio::test]
    async fn test_bad_base_url_is_config_error() {
        let mut limiter = RateLimiter::new();
        let mut http = HttpFetcher::new(Client::new(), SourceTag::Tmdb, &mut limiter);
        let err = http
            .get_text_with_query("not a url", &[("page", "1".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Config(_)));
    }
}
