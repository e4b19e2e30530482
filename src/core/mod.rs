// Core building blocks
pub mod delay;
pub mod events;
pub mod rate_limiter;

pub use delay::{parse_retry_after, retry_after_hint, Delay, RetryAfterError};
pub use events::{EventSink, FetchEvent, RecordingSink, TracingSink};
pub use rate_limiter::RateLimiter;
