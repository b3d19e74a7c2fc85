//! Per-host request spacing.
//!
//! The mirror talks to a single public host for thousands of listing pages
//! and files. [`RateLimiter`] enforces a minimum delay between consecutive
//! requests to the same host, regardless of how many crawl or transfer tasks
//! are running, and stretches that delay when the server answers 429 with a
//! `Retry-After` header.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use etsi_sync::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(250)));
//!
//! // First request to a host proceeds immediately
//! limiter.acquire("http://www.etsi.org/deliver/etsi_ts/").await;
//!
//! // Second request to the same host waits for the delay
//! limiter.acquire("http://www.etsi.org/deliver/etsi_tr/").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{CUMULATIVE_DELAY_WARNING_THRESHOLD, MAX_RETRY_AFTER};

/// Per-host rate limiter shared by the crawler and the retrieval engine.
///
/// Wrap in `Arc` and clone into spawned tasks. Per-host state is cloned out
/// of the `DashMap` before awaiting so no shard lock is held across a sleep.
#[derive(Debug)]
pub struct RateLimiter {
    default_delay: Duration,
    disabled: bool,
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// Earliest instant the next request may start. `None` until first use.
    next_allowed: Mutex<Option<Instant>>,
    cumulative_delay_ms: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            next_allowed: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(total)
    }
}

impl RateLimiter {
    /// Creates a limiter enforcing `default_delay` between requests to one host.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = default_delay.as_millis()))]
    pub fn new(default_delay: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            default_delay,
            disabled: default_delay.is_zero(),
            hosts: DashMap::new(),
        }
    }

    /// Creates a limiter that never waits (`--rate-limit 0`).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            default_delay: Duration::ZERO,
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the configured delay between requests.
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone()
    }

    /// Waits until a request to `url`'s host may start, then reserves the slot.
    ///
    /// A disabled limiter still honours delays recorded from `Retry-After`.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        let host = extract_host(url);
        tracing::Span::current().record("host", host.as_str());

        if self.disabled {
            let Some(state) = self.hosts.get(&host).map(|entry| Arc::clone(entry.value())) else {
                return;
            };
            let not_before = *state.next_allowed.lock().await;
            if let Some(not_before) = not_before {
                tokio::time::sleep_until(not_before).await;
            }
            return;
        }

        let state = self.host_state(&host);
        let mut next_allowed = state.next_allowed.lock().await;
        if let Some(not_before) = *next_allowed {
            let now = Instant::now();
            if now < not_before {
                let delay = not_before - now;
                let cumulative = state.add_cumulative_delay(delay);
                debug!(
                    host = %host,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying rate limit delay"
                );
                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD
                    && cumulative - delay < CUMULATIVE_DELAY_WARNING_THRESHOLD
                {
                    warn!(
                        host = %host,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "rate limiting has delayed requests to this host for a long time"
                    );
                }
                tokio::time::sleep_until(not_before).await;
            }
        }
        *next_allowed = Some(Instant::now() + self.default_delay);
    }

    /// Pushes the next allowed request to `url`'s host at least `delay` out.
    ///
    /// Called when the server answers 429 with a `Retry-After` header.
    #[instrument(skip(self), fields(host))]
    pub async fn record_rate_limit(&self, url: &str, delay: Duration) {
        let host = extract_host(url);
        tracing::Span::current().record("host", host.as_str());
        let state = self.host_state(&host);

        let candidate = Instant::now() + delay;
        let mut next_allowed = state.next_allowed.lock().await;
        if (*next_allowed).is_none_or(|current| current < candidate) {
            *next_allowed = Some(candidate);
        }
        debug!(host = %host, delay_ms = delay.as_millis(), "recorded server rate limit");
    }
}

/// Extracts the lowercase host from a URL, `"unknown"` when malformed.
///
/// ```
/// use etsi_sync::download::rate_limiter::extract_host;
///
/// assert_eq!(extract_host("http://www.ETSI.org/deliver/"), "www.etsi.org");
/// assert_eq!(extract_host("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value into a Duration.
///
/// Accepts integer seconds or an HTTP-date (RFC 7231). Values beyond one
/// hour are capped; past dates yield zero.
///
/// ```
/// use std::time::Duration;
/// use etsi_sync::download::rate_limiter::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    match httpdate::parse_http_date(header_value) {
        Ok(datetime) => Some(
            datetime
                .duration_since(std::time::SystemTime::now())
                .map_or(Duration::ZERO, |duration| duration.min(MAX_RETRY_AFTER)),
        ),
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delay_is_disabled() {
        assert!(RateLimiter::new(Duration::ZERO).is_disabled());
        assert!(RateLimiter::disabled().is_disabled());
        assert!(!RateLimiter::new(Duration::from_millis(10)).is_disabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire("http://www.etsi.org/a").await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_same_host_waits() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        limiter.acquire("http://www.etsi.org/a").await;
        limiter.acquire("http://www.etsi.org/b").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_hosts_do_not_wait_for_each_other() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        limiter.acquire("http://www.etsi.org/a").await;
        limiter.acquire("http://docbox.etsi.org/b").await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_rate_limit_delays_next_acquire() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        limiter.acquire("http://www.etsi.org/a").await;
        limiter
            .record_rate_limit("http://www.etsi.org/a", Duration::from_secs(30))
            .await;
        let start = Instant::now();
        limiter.acquire("http://www.etsi.org/b").await;
        assert!(start.elapsed() >= Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_limiter_still_honours_server_delay() {
        let limiter = RateLimiter::disabled();
        limiter
            .record_rate_limit("http://www.etsi.org/a", Duration::from_secs(3))
            .await;
        let start = Instant::now();
        limiter.acquire("http://www.etsi.org/b").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_parse_retry_after_caps_at_max() {
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_negative_is_none() {
        assert_eq!(parse_retry_after("-5"), None);
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }
}
