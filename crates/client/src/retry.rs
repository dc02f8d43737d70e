use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

pub(crate) const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub(crate) const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub(crate) const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// `X-RateLimit-Reset` values at or above this are Unix timestamps; smaller
/// values are seconds from now.
const RESET_EPOCH_THRESHOLD: u64 = 1_000_000_000;

/// Curve used to space out retry attempts.
///
/// Every variant stays at or below its ceiling.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// `base * multiplier^retry`, capped at `ceiling`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound on any delay.
        ceiling: Duration,
        /// Growth factor per retry. Must be finite and at least 1.
        multiplier: f64,
        /// Stagger successive retries of one call by adding 0 to 40%
        /// depending on the retry number. Concurrent calls at the same retry
        /// number still wait the same time.
        jitter: bool,
    },
    /// Same delay before every retry.
    Constant {
        delay: Duration,
    },
}

impl BackoffStrategy {
    /// Exponential doubling from `base` up to `ceiling`, with jitter.
    pub fn exponential(base: Duration, ceiling: Duration) -> Self {
        Self::Exponential {
            base,
            ceiling,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    ///
    /// ```
    /// use std::time::Duration;
    /// use watchtower_client::BackoffStrategy;
    ///
    /// let backoff = BackoffStrategy::Exponential {
    ///     base: Duration::from_millis(100),
    ///     ceiling: Duration::from_secs(1),
    ///     multiplier: 2.0,
    ///     jitter: false,
    /// };
    /// assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
    /// assert_eq!(backoff.delay_for(3), Duration::from_millis(800));
    /// assert_eq!(backoff.delay_for(4), Duration::from_secs(1));
    /// ```
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                ceiling,
                multiplier,
                jitter,
            } => {
                // Retry counts are small; the exponent saturates long before
                // the cast could wrap.
                #[allow(clippy::cast_possible_wrap)]
                let exponent = retry.min(64) as i32;
                let mut secs = base.as_secs_f64() * multiplier.powi(exponent);
                if *jitter {
                    secs *= 1.0 + 0.1 * f64::from(retry % 5);
                }
                // `min` also absorbs an infinite product.
                Duration::from_secs_f64(secs.min(ceiling.as_secs_f64()))
            }
            Self::Constant { delay } => *delay,
        }
    }

    /// Check that the strategy can produce delays.
    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::Exponential {
                base,
                ceiling,
                multiplier,
                ..
            } => {
                if !multiplier.is_finite() || *multiplier < 1.0 {
                    return Err(format!(
                        "backoff multiplier must be a finite number >= 1, got {multiplier}"
                    ));
                }
                if ceiling < base {
                    return Err(format!(
                        "backoff ceiling ({ceiling:?}) is lower than its base ({base:?})"
                    ));
                }
                Ok(())
            }
            Self::Constant { .. } => Ok(()),
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// How many times a request is retried and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` means a single attempt.
    pub retry_count: u32,
    pub backoff: BackoffStrategy,
    /// Longest server-requested wait the client will sit out. A longer
    /// `Retry-After` or rate-limit reset ends the retries instead.
    pub max_server_delay: Duration,
}

impl RetryPolicy {
    /// Total attempts, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Statuses worth another attempt: any 5xx and 429.
    ///
    /// Other 4xx describe a request that will fail the same way again.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }

    /// Wait before retry number `retry` (zero-based).
    ///
    /// A server-requested delay replaces the computed backoff. Returns `None`
    /// when that delay exceeds [`max_server_delay`](Self::max_server_delay),
    /// meaning the call should give up and report the response as is.
    pub fn delay_for(&self, retry: u32, server_delay: Option<Duration>) -> Option<Duration> {
        match server_delay {
            Some(delay) if delay > self.max_server_delay => None,
            Some(delay) => Some(delay),
            None => Some(self.backoff.delay_for(retry)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            backoff: BackoffStrategy::default(),
            max_server_delay: Duration::from_secs(60),
        }
    }
}

/// How long the server asked us to wait before trying again.
///
/// `Retry-After` wins. Without it, an exhausted rate-limit window
/// (`X-RateLimit-Remaining: 0`) waits until `X-RateLimit-Reset`.
pub(crate) fn server_delay(headers: &HeaderMap) -> Option<Duration> {
    retry_after(headers).or_else(|| rate_limit_reset(headers))
}

/// Time until the rate-limit window reopens, if it is currently closed.
fn rate_limit_reset(headers: &HeaderMap) -> Option<Duration> {
    if header_u64(headers, RATE_LIMIT_REMAINING)? != 0 {
        return None;
    }
    let reset = header_u64(headers, RATE_LIMIT_RESET)?;
    if reset < RESET_EPOCH_THRESHOLD {
        return Some(Duration::from_secs(reset));
    }
    let at = DateTime::<Utc>::from_timestamp(i64::try_from(reset).ok()?, 0)?;
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

pub(crate) fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Parse `Retry-After` as delta-seconds or an HTTP-date.
///
/// Dates in the past read as zero.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}
