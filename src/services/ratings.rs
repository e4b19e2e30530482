use crate::config::Settings;
use crate::core::delay::{retry_after_hint, Delay};
use crate::core::events::{EventSink, FetchEvent};
use crate::core::rate_limiter::RateLimiter;
use crate::models::{BattleId, BattleRatings, BattlesRequest, FetchOutcome, ServiceErrorBody};
use crate::services::retrying::{RetryError, RetryingTransport};
use crate::services::transport::{RawRequest, RawResponse, ReqwestTransport, Transport, TransportError};
use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

/// Public WHR endpoint of the Zero-K infrastructure
pub const DEFAULT_API_URL: &str = "https://zero-k.info/api/whr/battles";

/// Largest number of battle IDs sent in one request
///
/// Bigger requests tend to time out on the server.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 250;

/// Errors that abort a fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// The service answered with an error we have no recovery for
    #[error("HTTP {status} from ratings service: {body}")]
    Http {
        status: StatusCode,
        body: String,
        retry_after: Option<Delay>,
    },

    #[error(transparent)]
    Retry(#[from] RetryError),

    #[error("invalid ratings payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fetch task failed: {0}")]
    Task(#[from] JoinError),
}

type FetchFuture = Pin<Box<dyn Future<Output = Result<FetchOutcome, FetchError>> + Send>>;

/// Fetches WHR ratings for arbitrarily long lists of battle IDs
///
/// Large lists are cut into chunks fetched concurrently. A chunk the service
/// cannot answer as a whole, either because retries ran out or because it
/// reported a missing key, is halved recursively until the offending IDs are
/// isolated and skipped.
pub struct BatchFetcher<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: RetryingTransport<T>,
    url: String,
    max_batch_size: usize,
    sink: Arc<dyn EventSink>,
}

impl<T> Clone for BatchFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl BatchFetcher<ReqwestTransport> {
    /// Build the full client stack from configuration
    pub fn from_settings(settings: &Settings, sink: Arc<dyn EventSink>) -> Result<Self, TransportError> {
        let http = ReqwestTransport::new(
            Duration::from_secs(settings.service.connect_timeout_secs),
            Duration::from_secs(settings.service.request_timeout_secs),
        )?;
        let limiter = Arc::new(RateLimiter::with_sink(
            settings.rate_limit.max_calls,
            Duration::from_secs_f64(settings.rate_limit.period_secs),
            sink.clone(),
        ));
        let transport = RetryingTransport::new(http, limiter, settings.retry.max_attempts)
            .with_backoff_base(Duration::from_millis(settings.retry.backoff_base_ms))
            .with_sink(sink.clone());

        Ok(Self::new(
            transport,
            &settings.service.url,
            settings.batch.max_size,
            sink,
        ))
    }
}

impl<T: Transport + 'static> BatchFetcher<T> {
    /// A `max_batch_size` of zero is raised to one.
    pub fn new(
        transport: RetryingTransport<T>,
        url: &str,
        max_batch_size: usize,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                url: url.to_string(),
                max_batch_size: max_batch_size.max(1),
                sink,
            }),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size
    }

    /// Fetch ratings for `battle_ids`
    ///
    /// The returned outcome accounts for every input ID exactly once. Only
    /// unrecoverable failures are returned as errors, and then nothing is
    /// returned for the IDs that did succeed.
    pub fn fetch(&self, battle_ids: Vec<BattleId>) -> FetchFuture {
        let this = self.clone();
        Box::pin(async move { this.fetch_all(battle_ids).await })
    }

    async fn fetch_all(&self, battle_ids: Vec<BattleId>) -> Result<FetchOutcome, FetchError> {
        if battle_ids.is_empty() {
            return Ok(FetchOutcome::empty());
        }

        if battle_ids.len() <= self.inner.max_batch_size {
            return self.fetch_batch(battle_ids).await;
        }

        let chunks = battle_ids
            .chunks(self.inner.max_batch_size)
            .map(<[BattleId]>::to_vec)
            .collect();
        let outcome = self.gather(chunks).await?;
        self.verify(&battle_ids, &outcome);
        Ok(outcome)
    }

    /// One request for a batch within the size bound
    async fn fetch_batch(&self, battle_ids: Vec<BattleId>) -> Result<FetchOutcome, FetchError> {
        let request = RawRequest::json(&self.inner.url, &BattlesRequest::new(&battle_ids))?;

        let response = match self.inner.transport.send(&request).await {
            Ok(response) => response,
            Err(RetryError::MaxRetriesExceeded { .. }) => {
                self.inner.sink.emit(FetchEvent::RetriesExhausted {
                    batch_size: battle_ids.len(),
                });
                if battle_ids.len() == 1 {
                    return Ok(self.skip(battle_ids));
                }
                return self.split(battle_ids).await;
            }
            Err(e) => return Err(e.into()),
        };

        if !response.status.is_success() {
            if !is_missing_key_failure(&response) {
                return Err(FetchError::Http {
                    status: response.status,
                    body: response.text(),
                    retry_after: retry_after_hint(response.retry_after()),
                });
            }
            if battle_ids.len() == 1 {
                return Ok(self.skip(battle_ids));
            }
            return self.split(battle_ids).await;
        }

        let battles: Vec<BattleRatings> = response.json()?;
        let outcome = FetchOutcome::from_response(&battle_ids, battles);
        if !outcome.missing.is_empty() {
            self.inner.sink.emit(FetchEvent::Missing {
                requested: battle_ids.len(),
                returned: outcome.fetched.len(),
                battle_ids: outcome.missing.clone(),
            });
        }
        tracing::debug!(
            "Fetched {} of {} battles in one request",
            outcome.fetched.len(),
            battle_ids.len()
        );

        Ok(outcome)
    }

    /// Halve the batch and fetch both halves concurrently
    async fn split(&self, battle_ids: Vec<BattleId>) -> Result<FetchOutcome, FetchError> {
        self.inner.sink.emit(FetchEvent::Bisecting {
            batch_size: battle_ids.len(),
        });

        let mid = battle_ids.len() / 2;
        let halves = vec![battle_ids[..mid].to_vec(), battle_ids[mid..].to_vec()];
        let outcome = self.gather(halves).await?;
        self.verify(&battle_ids, &outcome);
        Ok(outcome)
    }

    /// Fetch every part in its own task and concatenate the outcomes in part
    /// order
    ///
    /// The first failure drops the set, which aborts the remaining tasks and,
    /// through them, their own children.
    async fn gather(&self, parts: Vec<Vec<BattleId>>) -> Result<FetchOutcome, FetchError> {
        let mut tasks = JoinSet::new();
        let count = parts.len();
        for (index, part) in parts.into_iter().enumerate() {
            let task = self.fetch(part);
            tasks.spawn(async move { (index, task.await) });
        }

        let mut outcomes: Vec<Option<FetchOutcome>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined?;
            outcomes[index] = Some(result?);
        }

        Ok(FetchOutcome::concat(outcomes.into_iter().flatten()))
    }

    fn skip(&self, battle_ids: Vec<BattleId>) -> FetchOutcome {
        for battle_id in &battle_ids {
            self.inner.sink.emit(FetchEvent::Skipped {
                battle_id: *battle_id,
            });
        }
        FetchOutcome::skipped(battle_ids)
    }

    fn verify(&self, requested: &[BattleId], outcome: &FetchOutcome) {
        if !outcome.accounts_for(requested) {
            self.inner.sink.emit(FetchEvent::ConsistencyMismatch {
                expected: requested.len(),
                fetched: outcome.fetched.len(),
                skipped: outcome.skipped.len(),
                missing: outcome.missing.len(),
            });
        }
    }
}

/// The server fails a whole batch with a 500 and a `KeyNotFoundException`
/// when one of the requested battles has no data
fn is_missing_key_failure(response: &RawResponse) -> bool {
    response.status == StatusCode::INTERNAL_SERVER_ERROR
        && response
            .json::<ServiceErrorBody>()
            .map(|body| body.is_key_not_found())
            .unwrap_or(false)
}
