use crate::core::events::{EventSink, FetchEvent, TracingSink};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rolling-window rate limiter
///
/// Allows at most `max_calls` grants within any trailing `period`. The window
/// holds the grant timestamps still inside the period; callers that find it
/// full release the lock, sleep until the oldest entry expires and check
/// again, since other tasks may take the freed slot in the meantime.
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    window: Mutex<VecDeque<Instant>>,
    sink: Arc<dyn EventSink>,
}

impl RateLimiter {
    /// Create a limiter that logs through `tracing`
    ///
    /// A `max_calls` of zero would never grant anything and is raised to one.
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self::with_sink(max_calls, period, Arc::new(TracingSink))
    }

    pub fn with_sink(max_calls: usize, period: Duration, sink: Arc<dyn EventSink>) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            period,
            window: Mutex::new(VecDeque::with_capacity(max_calls)),
            sink,
        }
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait until a call is permitted, then record it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = window.front() {
                    if now.duration_since(oldest) >= self.period {
                        window.pop_front();
                    } else {
                        break;
                    }
                }

                if window.len() < self.max_calls {
                    window.push_back(now);
                    return;
                }

                match window.front() {
                    Some(&oldest) => self.period.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };

            self.sink.emit(FetchEvent::Throttled { wait });
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::RecordingSink;

    #[tokio::test(start_paused = true)]
    async fn test_grants_up_to_limit_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_oldest_entry_to_expire() {
        let sink = Arc::new(RecordingSink::new());
        let limiter = RateLimiter::with_sink(2, Duration::from_secs(1), sink.clone());
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(sink.count(|e| matches!(e, FetchEvent::Throttled { .. })), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_is_clamped() {
        let limiter = RateLimiter::new(0, Duration::from_millis(100));
        assert_eq!(limiter.max_calls(), 1);

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
