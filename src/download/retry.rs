//! Retry logic with exponential backoff for transient listing failures.
//!
//! A listing page that cannot be fetched prunes a whole subtree, so the
//! crawler retries transient failures before giving up on a branch. File
//! transfers are not retried here: the retrieval engine performs exactly one
//! transfer per invocation and relies on the next run for repair.
//!
//! When a request fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//! - [`FailureType::RateLimited`] - Server rate limiting (retries with backoff or `Retry-After`)
//!
//! # Example
//!
//! ```
//! use etsi_sync::TransportError;
//! use etsi_sync::download::{RetryPolicy, RetryDecision, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = TransportError::http_status("http://www.etsi.org/deliver/etsi_ts/", 503);
//! let failure_type = classify_error(&error);
//!
//! match policy.should_retry(failure_type, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use crate::error::TransportError;

/// Default number of listing retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Upper bound of the random delay added to every backoff.
const MAX_JITTER: Duration = Duration::from_millis(500);

/// How a failed listing fetch should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Timeouts, dropped connections, 408 and 5xx.
    Transient,
    /// 404 and other 4xx, TLS failures, unusable URLs.
    Permanent,
    /// HTTP 429; waits for `Retry-After` when the server sends one.
    RateLimited,
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt`.
    Retry {
        /// Backoff before the next attempt.
        delay: Duration,
        /// 1-indexed number of the next attempt.
        attempt: u32,
    },
    /// Give up on this listing.
    DoNotRetry {
        /// Why the listing is abandoned.
        reason: String,
    },
}

/// Bounded exponential backoff with jitter.
///
/// The n-th retry waits `min(base_delay * multiplier^(n-1), max_delay)`
/// plus up to 500 ms of jitter. With defaults that is roughly 1 s, 2 s, then 4 s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES + 1,
            DEFAULT_BASE_DELAY,
            DEFAULT_MAX_DELAY,
            DEFAULT_BACKOFF_MULTIPLIER,
        )
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` counts the first attempt and is at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Default backoff with a custom attempt budget.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self::new(
            max_attempts,
            DEFAULT_BASE_DELAY,
            DEFAULT_MAX_DELAY,
            DEFAULT_BACKOFF_MULTIPLIER,
        )
    }

    /// Returns the attempt budget, the first attempt included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what to do after attempt number `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }
        if attempt >= self.max_attempts {
            debug!(attempt, "attempt budget used up");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff(attempt) + jitter();
        debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff before the retry that follows `attempt`, without jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = f64::from(self.backoff_multiplier).powi(exponent);
        let scaled = self.base_delay.as_secs_f64() * factor;
        if scaled.is_finite() && scaled < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(scaled)
        } else {
            self.max_delay
        }
    }
}

fn jitter() -> Duration {
    let max_ms = u64::try_from(MAX_JITTER.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Classifies a transport error for the listing retry loop.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | Other HTTP status | Permanent |
/// | Timeout | Transient |
/// | Network (TLS) | Permanent |
/// | Network (other) | Transient |
/// | InvalidUrl, ClientBuild | Permanent |
#[instrument]
pub fn classify_error(error: &TransportError) -> FailureType {
    match error {
        TransportError::HttpStatus { status, .. } => match *status {
            408 | 500..=599 => FailureType::Transient,
            429 => FailureType::RateLimited,
            _ => FailureType::Permanent,
        },
        TransportError::Timeout { .. } => FailureType::Transient,
        TransportError::Network { source, .. } if is_tls_error(source) => FailureType::Permanent,
        TransportError::Network { .. } => FailureType::Transient,
        TransportError::InvalidUrl { .. } | TransportError::ClientBuild { .. } => {
            FailureType::Permanent
        }
    }
}

/// reqwest exposes no TLS error kind, so this matches on the message.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let message = error.to_string().to_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| message.contains(needle))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LISTING: &str = "http://www.etsi.org/deliver/etsi_ts/";

    #[test]
    fn test_listing_statuses_classify_for_retry() {
        let cases = [
            (404, FailureType::Permanent),
            (403, FailureType::Permanent),
            (408, FailureType::Transient),
            (429, FailureType::RateLimited),
            (500, FailureType::Transient),
            (503, FailureType::Transient),
            (304, FailureType::Permanent),
        ];
        for (status, expected) in cases {
            let error = TransportError::http_status(LISTING, status);
            assert_eq!(classify_error(&error), expected, "status {status}");
        }
    }

    #[test]
    fn test_timeout_is_transient_and_bad_url_is_permanent() {
        assert_eq!(
            classify_error(&TransportError::timeout(LISTING)),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&TransportError::invalid_url("deliver/../x")),
            FailureType::Permanent
        );
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        let source = reqwest::Client::new()
            .get("http://127.0.0.1:9/deliver/etsi_ts/")
            .send()
            .await
            .unwrap_err();
        assert!(!is_tls_error(&source));
        let error = TransportError::network(LISTING, source);
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_permanent_failure_is_never_retried() {
        let policy = RetryPolicy::with_max_attempts(5);
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_attempt_budget_includes_first_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(1), 2.0);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::RateLimited, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        match policy.should_retry(FailureType::Transient, 3) {
            RetryDecision::DoNotRetry { reason } => assert!(reason.contains("exhausted")),
            other => panic!("expected DoNotRetry, got {other:?}"),
        }
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), DEFAULT_MAX_RETRIES + 1);
    }

    #[test]
    fn test_backoff_doubles_until_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_delay_stays_within_jitter_bound() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(32), 2.0);
        for _ in 0..50 {
            let RetryDecision::Retry { delay, .. } = policy.should_retry(FailureType::Transient, 1)
            else {
                panic!("expected a retry");
            };
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(2) + MAX_JITTER);
        }
    }
}
