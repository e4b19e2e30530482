//! WHR Fetch - fault-tolerant batch client for the Zero-K WHR ratings service
//!
//! This library fetches per-battle player ratings for large lists of battle
//! IDs. Requests are rate limited with a rolling window, retried on timeouts
//! and 429 responses, and batches the server cannot answer are bisected until
//! the battles responsible are isolated.

pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use crate::core::{Delay, EventSink, FetchEvent, RateLimiter, RecordingSink, TracingSink};
pub use crate::models::{BattleId, BattleRatings, FetchOutcome, PlayerRating};
pub use crate::services::{BatchFetcher, FetchError, RetryError, RetryingTransport, Transport};
