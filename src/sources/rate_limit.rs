//! Per-source politeness delay between outbound requests
use crate::catalog::SourceTag;
use crate::config::Config;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Minimum spacing between requests to the same source
///
/// One limiter is owned by the orchestrator for the length of a cycle. Sources without a
/// configured delay are never throttled.
#[derive(Debug, Default)]
pub struct RateLimiter {
    delays: HashMap<SourceTag, Duration>,
    last_request: HashMap<SourceTag, Instant>,
}

impl RateLimiter {
    /// Limiter with no delays
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays taken from each source's `request_delay_ms`
    pub fn from_config(config: &Config) -> Self {
        let src = &config.sources;
        let mut limiter = Self::new();
        limiter.set_delay(SourceTag::Wikipedia, Duration::from_millis(src.wikipedia.request_delay_ms));
        limiter.set_delay(SourceTag::Imdb, Duration::from_millis(src.imdb.request_delay_ms));
        limiter.set_delay(SourceTag::Tvmaze, Duration::from_millis(src.tvmaze.request_delay_ms));
        limiter.set_delay(SourceTag::Tmdb, Duration::from_millis(src.tmdb.request_delay_ms));
        limiter.set_delay(SourceTag::Omdb, Duration::from_millis(src.omdb.request_delay_ms));
        limiter
    }

    pub fn set_delay(&mut self, source: SourceTag, delay: Duration) {
        self.delays.insert(source, delay);
    }

    pub fn delay_for(&self, source: SourceTag) -> Duration {
        self.delays.get(&source).copied().unwrap_or(Duration::ZERO)
    }

    /// Sleep until the source's delay has passed since its previous request
    pub async fn wait(&mut self, source: SourceTag) {
        let delay = self.delay_for(source);
        if delay.is_zero() {
            return;
        }

        if let Some(last) = self.last_request.get(&source) {
            let ready_at = *last + delay;
            if ready_at > Instant::now() {
                debug!("⏳ Throttling {} for {:?}", source, ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last_request.insert(source, Instant::now());
    }
}
