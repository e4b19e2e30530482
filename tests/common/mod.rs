// Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use whr_fetch::models::{BattleId, BattleRatings, BattlesRequest, PlayerRating};
use whr_fetch::services::{
    BatchFetcher, RawRequest, RawResponse, RetryingTransport, Transport, TransportError,
};
use whr_fetch::{EventSink, RateLimiter, RecordingSink};

pub const TEST_URL: &str = "http://ratings.test/api/whr/battles";

/// One physical request seen by a [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub struct Call {
    pub battle_ids: Vec<BattleId>,
    pub at: Instant,
    /// 1-based count of requests with identical contents, this one included
    pub repeat: usize,
}

type Responder = dyn Fn(&[BattleId], usize) -> Result<RawResponse, TransportError> + Send + Sync;

/// In-memory ratings service driven by a closure
///
/// The closure receives the requested IDs and how many times this exact
/// request has been seen, and decides the response.
#[derive(Clone)]
pub struct ScriptedTransport {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[BattleId], usize) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A service that answers every request in full
    pub fn healthy() -> Self {
        Self::new(|ids, _| Ok(ratings_response(ids)))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &RawRequest) -> Result<RawResponse, TransportError> {
        let body: BattlesRequest = serde_json::from_slice(&request.body).expect("request body is JSON");
        let repeat = {
            let mut calls = self.calls.lock().unwrap();
            let repeat = 1 + calls.iter().filter(|c| c.battle_ids == body.battle_ids).count();
            calls.push(Call {
                battle_ids: body.battle_ids.clone(),
                at: Instant::now(),
                repeat,
            });
            repeat
        };
        (self.responder)(&body.battle_ids, repeat)
    }
}

pub fn battle(id: BattleId) -> BattleRatings {
    BattleRatings {
        id,
        players: vec![
            PlayerRating {
                account_id: id * 10,
                rating: Some(1500.0 + id as f64),
                stdev: Some(100.0),
            },
            PlayerRating {
                account_id: id * 10 + 1,
                rating: Some(1400.0),
                stdev: Some(120.0),
            },
        ],
    }
}

pub fn ratings_response(ids: &[BattleId]) -> RawResponse {
    let battles: Vec<BattleRatings> = ids.iter().map(|id| battle(*id)).collect();
    RawResponse::new(StatusCode::OK, serde_json::to_vec(&battles).unwrap())
}

pub fn key_not_found() -> RawResponse {
    RawResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"Message":"An error has occurred.","ExceptionMessage":"The given key was not present in the dictionary.","ExceptionType":"System.Collections.Generic.KeyNotFoundException","StackTrace":"   at ..."}"#,
    )
}

pub fn timeout() -> Result<RawResponse, TransportError> {
    Err(TransportError::Timeout("operation timed out".into()))
}

/// A non-timeout transport failure, which is never retried
pub fn request_failure() -> Result<RawResponse, TransportError> {
    let err = reqwest::Client::new()
        .post("not a url")
        .build()
        .expect_err("an invalid URL cannot build a request");
    Err(TransportError::Request(err))
}

/// Knobs for [`build_fetcher`]
pub struct Setup {
    pub max_calls: usize,
    pub period: Duration,
    pub max_attempts: u32,
    pub max_batch_size: usize,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            max_calls: 5,
            period: Duration::from_secs(1),
            max_attempts: 10,
            max_batch_size: 250,
        }
    }
}

/// Full client stack over a scripted transport, recording its events
pub fn build_fetcher(
    transport: ScriptedTransport,
    setup: Setup,
) -> (BatchFetcher<ScriptedTransport>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let shared: Arc<dyn EventSink> = sink.clone();
    let limiter = Arc::new(RateLimiter::with_sink(setup.max_calls, setup.period, shared.clone()));
    let retrying = RetryingTransport::new(transport, limiter, setup.max_attempts).with_sink(shared.clone());
    let fetcher = BatchFetcher::new(retrying, TEST_URL, setup.max_batch_size, shared);
    (fetcher, sink)
}

pub fn fetched_ids(outcome: &whr_fetch::FetchOutcome) -> Vec<BattleId> {
    outcome.fetched.iter().map(|b| b.id).collect()
}
