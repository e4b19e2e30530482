use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Raised when a `Retry-After` value is neither delta-seconds nor an HTTP date
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable Retry-After header: {0:?}")]
pub struct RetryAfterError(pub String);

/// How long to hold off before the next attempt
///
/// Servers express this either relative to now (`Retry-After: 2`) or as an
/// absolute point in time (`Retry-After: Wed, 21 Oct 2015 07:28:00 GMT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    After(Duration),
    Until(DateTime<Utc>),
}

impl Delay {
    /// Exponential backoff: `base * 2^(attempt - 1)`, attempts counted from 1
    pub fn backoff(base: Duration, attempt: u32) -> Self {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Delay::After(base.saturating_mul(factor))
    }

    /// Time left until the delay has elapsed, measured from now
    pub fn remaining(&self) -> Duration {
        match self {
            Delay::After(duration) => *duration,
            Delay::Until(deadline) => (*deadline - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Suspend the calling task until the delay has elapsed
    pub async fn wait(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
    }
}

/// Parse a `Retry-After` header value
///
/// Accepts delta-seconds (`"120"`) or an HTTP date in RFC 2822 form.
pub fn parse_retry_after(value: &str) -> Result<Delay, RetryAfterError> {
    let trimmed = value.trim();

    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Delay::After(Duration::from_secs(secs)));
    }

    DateTime::parse_from_rfc2822(trimmed)
        .map(|date| Delay::Until(date.with_timezone(&Utc)))
        .map_err(|_| RetryAfterError(value.to_string()))
}

/// Lenient variant for contexts where the header is advisory: a missing or
/// malformed value means no directive was given
pub fn retry_after_hint(value: Option<&str>) -> Option<Delay> {
    let value = value?;
    match parse_retry_after(value) {
        Ok(delay) => Some(delay),
        Err(e) => {
            tracing::debug!("Ignoring advisory header: {}", e);
            None
        }
    }
}
