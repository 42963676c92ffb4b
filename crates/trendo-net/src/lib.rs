//! # Trendo Net
//!
//! Request and response types plus the network fetchers used by the TrendoAI
//! offline worker.
//!
//! ## Design Goals
//!
//! 1. **Browser-shaped requests**: mode and destination travel with every request
//! 2. **Response types**: `basic`, `cors` and `opaque` are classified against the app origin
//! 3. **Clone-on-read**: a response body can be materialized twice
//! 4. **Pluggable fetch**: the worker talks to a [`Fetcher`], never to reqwest directly

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

pub mod loader;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use loader::{Fetcher, HttpFetcher, LoaderConfig};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedFetcher;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network unreachable for {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Response body already consumed")]
    BodyConsumed,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl NetError {
    /// Create an unreachable error for a URL.
    pub fn unreachable(url: &Url, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure means the network could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            NetError::Unreachable { .. } => true,
            NetError::HttpError(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Request mode, as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    SameOrigin,
    /// Cross-origin reads produce opaque responses.
    NoCors,
    #[default]
    Cors,
}

/// What the requested resource will be used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestDestination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    /// `fetch()` calls and anything else without a destination.
    #[default]
    Empty,
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
    pub destination: RequestDestination,
    pub referrer: Option<Url>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::default(),
            destination: RequestDestination::default(),
            referrer: None,
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            destination: RequestDestination::Document,
            ..Self::get(url)
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the request mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the request destination.
    pub fn destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    /// Set referrer.
    pub fn referrer(mut self, referrer: Url) -> Self {
        self.referrer = Some(referrer);
        self
    }

    /// Whether this request loads a top-level page.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination == RequestDestination::Document
    }
}

/// Response type, classified against the app origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Same-origin.
    Basic,
    /// Cross-origin, readable.
    Cors,
    /// Cross-origin no-cors; status and body are hidden.
    Opaque,
    /// Network error surfaced as a response.
    Error,
}

/// HTTP response.
#[derive(Debug)]
pub struct Response {
    pub url: Url,
    /// Status code; 0 for opaque and error responses.
    pub status: u16,
    pub headers: HeaderMap,
    pub response_type: ResponseType,
    pub redirected: bool,
    /// Set when the response was answered from a cache generation.
    pub from_cache: bool,
    body: ResponseBody,
}

/// Response body variants.
#[derive(Debug)]
enum ResponseBody {
    /// Full body already loaded.
    Full(Bytes),
    /// Streaming body, readable once.
    Stream(mpsc::Receiver<Result<Bytes, NetError>>),
    /// Empty.
    Empty,
}

impl Response {
    /// Create a response with a fully loaded body.
    pub fn new(url: Url, status: u16, response_type: ResponseType, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            response_type,
            redirected: false,
            from_cache: false,
            body: ResponseBody::Full(body.into()),
        }
    }

    /// Create a response whose body arrives in chunks.
    pub fn streaming(
        url: Url,
        status: u16,
        response_type: ResponseType,
        chunks: mpsc::Receiver<Result<Bytes, NetError>>,
    ) -> Self {
        Self {
            body: ResponseBody::Stream(chunks),
            ..Self::new(url, status, response_type, Bytes::new())
        }
    }

    /// Create an opaque response for a cross-origin no-cors read.
    pub fn opaque(url: Url) -> Self {
        Self {
            body: ResponseBody::Empty,
            ..Self::new(url, 0, ResponseType::Opaque, Bytes::new())
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Canonical reason phrase for the status.
    pub fn status_text(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
    }

    /// Whether the body is still a single-consumption stream.
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Stream(_))
    }

    /// Materialize the body once and return two responses sharing it.
    ///
    /// The first is meant for the caller, the second for storage.
    pub async fn duplicate(self) -> Result<(Response, Response), NetError> {
        let Response {
            url,
            status,
            headers,
            response_type,
            redirected,
            from_cache,
            body,
        } = self;
        let bytes = read_body(body).await?;

        let first = Response {
            url: url.clone(),
            status,
            headers: headers.clone(),
            response_type,
            redirected,
            from_cache,
            body: ResponseBody::Full(bytes.clone()),
        };
        let second = Response {
            url,
            status,
            headers,
            response_type,
            redirected,
            from_cache,
            body: ResponseBody::Full(bytes),
        };
        Ok((first, second))
    }

    /// Get the body as bytes.
    pub async fn bytes(self) -> Result<Bytes, NetError> {
        read_body(self.body).await
    }

    /// Get the body as text.
    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

async fn read_body(body: ResponseBody) -> Result<Bytes, NetError> {
    match body {
        ResponseBody::Full(b) => Ok(b),
        ResponseBody::Stream(mut rx) => {
            let mut chunks = Vec::new();
            while let Some(chunk) = rx.recv().await {
                chunks.push(chunk?);
            }
            Ok(chunks.into_iter().flatten().collect())
        }
        ResponseBody::Empty => Ok(Bytes::new()),
    }
}

/// Whether two URLs share scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}
