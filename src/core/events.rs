use crate::core::delay::Delay;
use crate::models::BattleId;
use std::sync::Mutex;
use std::time::Duration;

/// Diagnostic events emitted while fetching ratings
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// The rate limiter made a caller wait for window capacity
    Throttled { wait: Duration },
    /// A physical attempt timed out
    TimedOut {
        url: String,
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },
    /// The server answered 429
    RateLimited {
        url: String,
        attempt: u32,
        max_attempts: u32,
        retry_after: Option<Delay>,
    },
    /// A batch could not be resolved by direct request
    RetriesExhausted { batch_size: usize },
    /// A batch is being halved to isolate a poisoned identifier
    Bisecting { batch_size: usize },
    /// A single identifier consistently fails on the server
    Skipped { battle_id: BattleId },
    /// The server dropped identifiers from an otherwise successful response
    Missing {
        requested: usize,
        returned: usize,
        battle_ids: Vec<BattleId>,
    },
    /// Merged result sizes do not add up to the request
    ConsistencyMismatch {
        expected: usize,
        fetched: usize,
        skipped: usize,
        missing: usize,
    },
}

/// Destination for [`FetchEvent`]s
///
/// Every component captures a sink at construction so diagnostics can be
/// observed without a global logger.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: FetchEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: FetchEvent) {
        match event {
            FetchEvent::Throttled { wait } => {
                tracing::trace!("Rate limit window full, waiting {:?}", wait);
            }
            FetchEvent::TimedOut { url, attempt, max_attempts, reason } => {
                tracing::info!("Timeout {} ({}) attempt {}/{}", url, reason, attempt, max_attempts);
            }
            FetchEvent::RateLimited { url, attempt, max_attempts, retry_after } => {
                tracing::info!(
                    "HTTP Request: {} \"429 Too Many Requests\" attempt {}/{} (retry after: {:?})",
                    url,
                    attempt,
                    max_attempts,
                    retry_after
                );
            }
            FetchEvent::RetriesExhausted { batch_size } => {
                tracing::warn!("Retries exceeded for a batch of {} battle IDs, splitting", batch_size);
            }
            FetchEvent::Bisecting { batch_size } => {
                tracing::debug!("Bisecting batch of {} battle IDs", batch_size);
            }
            FetchEvent::Skipped { battle_id } => {
                tracing::warn!("Skipping battle {}: server fails every request containing it", battle_id);
            }
            FetchEvent::Missing { requested, returned, battle_ids } => {
                tracing::warn!(
                    "Request did not return data for all requested battles, {} != {}. missing: {:?}",
                    returned,
                    requested,
                    battle_ids
                );
            }
            FetchEvent::ConsistencyMismatch { expected, fetched, skipped, missing } => {
                tracing::warn!(
                    "Mismatch in merged results: fetched {} + skipped {} + missing {} != requested {}",
                    fetched,
                    skipped,
                    missing,
                    expected
                );
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<FetchEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far, in emission order
    pub fn events(&self) -> Vec<FetchEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&FetchEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: FetchEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
