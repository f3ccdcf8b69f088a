//! Network exchange with a cancellable deadline.
//!
//! ### Upstream
//! - The network is reached through the [`Upstream`] trait so the router can
//!   run against a scripted upstream in tests.
//! - [`HttpUpstream`] is the reqwest implementation (rustls, compressed bodies,
//!   limited redirects). Every HTTP status is a response, not an error.
//!
//! ### Deadlines
//! - [`fetch_with_timeout`] races the exchange against a timer.
//! - When the timer wins, the exchange's [`CancellationToken`] is cancelled and
//!   the exchange future is dropped, which aborts the underlying connection.
//! - [`Timeout::Infinite`] waits for as long as the exchange takes.

pub mod url;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use offshelf_core::Error;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::request::{Request, Response, Source};

pub use url::{UrlError, cache_key, canonicalize, resolve};

/// How long a single network attempt may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    After(Duration),
    Infinite,
}

impl Timeout {
    pub fn from_millis(ms: u64) -> Self {
        Timeout::After(Duration::from_millis(ms))
    }
}

/// Something that can perform one network exchange.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Perform the exchange, giving up with [`Error::Network`] once `cancel` fires.
    async fn exchange(&self, request: &Request, cancel: CancellationToken) -> Result<Response, Error>;
}

/// Issue one exchange, failing with [`Error::Timeout`] if it outlives `timeout`.
pub async fn fetch_with_timeout(upstream: &dyn Upstream, request: &Request, timeout: Timeout) -> Result<Response, Error> {
    let cancel = CancellationToken::new();
    let limit = match timeout {
        Timeout::Infinite => return upstream.exchange(request, cancel).await,
        Timeout::After(limit) => limit,
    };

    tokio::select! {
        result = upstream.exchange(request, cancel.child_token()) => result,
        _ = tokio::time::sleep(limit) => {
            cancel.cancel();
            tracing::debug!(url = %request.url, timeout_ms = limit.as_millis() as u64, "request timed out");
            Err(Error::Timeout(format!("{} exceeded {}ms", request.url, limit.as_millis())))
        }
    }
}

/// Configuration for the HTTP upstream.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "offshelf/0.1")
    pub user_agent: String,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "offshelf/0.1".to_string(), max_redirects: 5 }
    }
}

/// reqwest-backed [`Upstream`].
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    http: Client,
}

impl HttpUpstream {
    /// Create a new upstream with the given configuration.
    ///
    /// No client-wide timeout is set: deadlines belong to each attempt.
    pub fn new(config: &FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }

    async fn send(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(network_error)?;

        tracing::debug!(
            url = %request.url,
            final_url = %final_url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched from network"
        );

        Ok(Response { url: request.url.clone(), status, headers, body, source: Source::Network })
    }
}

fn network_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::Timeout(err.to_string()) } else { Error::Network(err.to_string()) }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn exchange(&self, request: &Request, cancel: CancellationToken) -> Result<Response, Error> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Network(format!("exchange aborted: {}", request.url))),
            result = self.send(request) => result,
        }
    }
}
