use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single physical HTTP exchange
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect or read timeout; worth another attempt
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else {
            TransportError::Request(e)
        }
    }
}

/// A JSON POST to send
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub url: String,
    pub body: Vec<u8>,
}

impl RawRequest {
    pub fn json<T: Serialize>(url: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            url: url.to_string(),
            body: serde_json::to_vec(payload)?,
        })
    }
}

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Raw `Retry-After` value, if present and valid ASCII
    pub fn retry_after(&self) -> Option<&str> {
        self.headers.get(RETRY_AFTER)?.to_str().ok()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One physical HTTP exchange, without retries or rate limiting
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RawRequest) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`
///
/// The client does no retrying of its own; every physical request must pass
/// through the rate limiter above it.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RawRequest) -> Result<RawResponse, TransportError> {
        tracing::debug!("POST {} ({} bytes)", request.url, request.body.len());

        let response = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        tracing::debug!("HTTP Request: POST {} \"{}\"", request.url, status);

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
