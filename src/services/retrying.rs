use crate::core::delay::{parse_retry_after, Delay, RetryAfterError};
use crate::core::events::{EventSink, FetchEvent, TracingSink};
use crate::core::rate_limiter::RateLimiter;
use crate::services::transport::{RawRequest, RawResponse, Transport, TransportError};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default base for exponential backoff between attempts
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Terminal failures of a logical request
#[derive(Debug, Error)]
pub enum RetryError {
    /// Every attempt timed out or was rate limited
    #[error("maximum retry attempts ({attempts}) reached for {url}")]
    MaxRetriesExceeded { url: String, attempts: u32 },

    /// The server sent 429 with a `Retry-After` we cannot honor
    #[error(transparent)]
    InvalidRetryAfter(#[from] RetryAfterError),

    /// Non-retryable transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Rate-limited, retrying wrapper around a [`Transport`]
///
/// Each physical attempt first acquires the rate limiter. Timeouts and 429
/// responses are retried; every other response is handed back as-is, error
/// statuses included.
pub struct RetryingTransport<T> {
    inner: T,
    limiter: Arc<RateLimiter>,
    max_attempts: u32,
    backoff_base: Duration,
    sink: Arc<dyn EventSink>,
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, limiter: Arc<RateLimiter>, max_attempts: u32) -> Self {
        Self {
            inner,
            limiter,
            max_attempts,
            backoff_base: DEFAULT_BACKOFF_BASE,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Perform one logical request
    pub async fn send(&self, request: &RawRequest) -> Result<RawResponse, RetryError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let mut directive = None;
            match self.inner.send(request).await {
                Ok(response) if response.status == StatusCode::TOO_MANY_REQUESTS => {
                    if let Some(value) = response.headers.get(RETRY_AFTER) {
                        let value = value.to_str().map_err(|_| {
                            RetryAfterError(String::from_utf8_lossy(value.as_bytes()).into_owned())
                        })?;
                        directive = Some(parse_retry_after(value)?);
                    }
                    self.sink.emit(FetchEvent::RateLimited {
                        url: request.url.clone(),
                        attempt,
                        max_attempts: self.max_attempts,
                        retry_after: directive,
                    });
                }
                Ok(response) => return Ok(response),
                Err(TransportError::Timeout(reason)) => {
                    self.sink.emit(FetchEvent::TimedOut {
                        url: request.url.clone(),
                        attempt,
                        max_attempts: self.max_attempts,
                        reason,
                    });
                }
                Err(e) => return Err(e.into()),
            }

            if attempt >= self.max_attempts {
                return Err(RetryError::MaxRetriesExceeded {
                    url: request.url.clone(),
                    attempts: attempt,
                });
            }

            directive
                .unwrap_or_else(|| Delay::backoff(self.backoff_base, attempt))
                .wait()
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::RecordingSink;
    use async_trait::async_trait;
    use reqwest::header::HeaderValue;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays canned results, one per attempt, and notes when each arrived
    struct Canned {
        results: Mutex<Vec<Result<RawResponse, TransportError>>>,
        seen: Mutex<Vec<Instant>>,
    }

    impl Canned {
        fn new(mut results: Vec<Result<RawResponse, TransportError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<Instant> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Arc<Canned> {
        async fn send(&self, _request: &RawRequest) -> Result<RawResponse, TransportError> {
            self.seen.lock().unwrap().push(Instant::now());
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(RawResponse::new(StatusCode::OK, "[]")))
        }
    }

    fn request() -> RawRequest {
        RawRequest::json("http://ratings.test/battles", &serde_json::json!({"battleids": [1]})).unwrap()
    }

    fn retrying(canned: Arc<Canned>, max_attempts: u32) -> RetryingTransport<Arc<Canned>> {
        let limiter = Arc::new(RateLimiter::new(100, Duration::from_secs(1)));
        RetryingTransport::new(canned, limiter, max_attempts)
    }

    fn assert_gap(earlier: Instant, later: Instant, expected: Duration) {
        let gap = later - earlier;
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(50),
            "expected a gap of {:?}, got {:?}",
            expected,
            gap
        );
    }

    fn timeout() -> Result<RawResponse, TransportError> {
        Err(TransportError::Timeout("read timed out".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_returned_not_retried() {
        let canned = Arc::new(Canned::new(vec![Ok(RawResponse::new(StatusCode::NOT_FOUND, ""))]));
        let transport = retrying(canned.clone(), 5);

        let response = transport.send(&request()).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(canned.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule_between_timeouts() {
        let canned = Arc::new(Canned::new(vec![timeout(), timeout(), timeout()]));
        let transport = retrying(canned.clone(), 5);

        let response = transport.send(&request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let seen = canned.attempts();
        assert_eq!(seen.len(), 4);
        assert_gap(seen[0], seen[1], Duration::from_millis(500));
        assert_gap(seen[1], seen[2], Duration::from_secs(1));
        assert_gap(seen[2], seen[3], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_distinct_error() {
        let canned = Arc::new(Canned::new(vec![timeout(), timeout(), timeout()]));
        let sink = Arc::new(RecordingSink::new());
        let transport = retrying(canned.clone(), 3).with_sink(sink.clone());

        let err = transport.send(&request()).await.unwrap_err();

        assert!(matches!(err, RetryError::MaxRetriesExceeded { attempts: 3, .. }));
        assert_eq!(canned.attempts().len(), 3);
        assert_eq!(sink.count(|e| matches!(e, FetchEvent::TimedOut { .. })), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_overrides_backoff() {
        let limited = RawResponse::new(StatusCode::TOO_MANY_REQUESTS, "")
            .with_header(RETRY_AFTER, HeaderValue::from_static("7"));
        let canned = Arc::new(Canned::new(vec![Ok(limited)]));
        let transport = retrying(canned.clone(), 3);

        transport.send(&request()).await.unwrap();

        let seen = canned.attempts();
        assert_eq!(seen.len(), 2);
        assert_gap(seen[0], seen[1], Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_without_header_uses_backoff() {
        let canned = Arc::new(Canned::new(vec![Ok(RawResponse::new(StatusCode::TOO_MANY_REQUESTS, ""))]));
        let transport = retrying(canned.clone(), 3).with_backoff_base(Duration::from_millis(100));

        transport.send(&request()).await.unwrap();

        let seen = canned.attempts();
        assert_gap(seen[0], seen[1], Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_retry_after_is_fatal() {
        let limited = RawResponse::new(StatusCode::TOO_MANY_REQUESTS, "")
            .with_header(RETRY_AFTER, HeaderValue::from_static("whenever"));
        let canned = Arc::new(Canned::new(vec![Ok(limited)]));
        let transport = retrying(canned.clone(), 5);

        let err = transport.send(&request()).await.unwrap_err();

        assert!(matches!(err, RetryError::InvalidRetryAfter(_)));
        assert_eq!(canned.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_sends_once() {
        let canned = Arc::new(Canned::new(vec![timeout()]));
        let transport = retrying(canned.clone(), 0);

        let err = transport.send(&request()).await.unwrap_err();

        assert!(matches!(err, RetryError::MaxRetriesExceeded { attempts: 1, .. }));
    }
}
