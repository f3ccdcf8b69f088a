//! Scripted upstream for router and lifecycle tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use offshelf_core::Error;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::fetch::Upstream;
use crate::request::{Request, Response, Source};

#[derive(Debug, Clone)]
pub(crate) struct Scripted {
    status: u16,
    body: Vec<u8>,
    content_type: &'static str,
    delay: Duration,
    refuse: bool,
}

/// A scripted reply with a plain-text body.
pub(crate) fn reply(status: u16, body: &str) -> Scripted {
    Scripted {
        status,
        body: body.as_bytes().to_vec(),
        content_type: "text/plain",
        delay: Duration::ZERO,
        refuse: false,
    }
}

/// A scripted connection failure.
pub(crate) fn refuse() -> Scripted {
    Scripted { refuse: true, ..reply(0, "") }
}

impl Scripted {
    pub(crate) fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub(crate) fn json(mut self) -> Self {
        self.content_type = "application/json";
        self
    }
}

/// Upstream answering from per-URL queues.
///
/// Replies are consumed in order; the last one for a URL keeps repeating.
/// URLs without a script fail like an unreachable host.
#[derive(Default)]
pub(crate) struct ScriptedUpstream {
    replies: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl ScriptedUpstream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, scripted: Scripted) {
        self.replies.lock().unwrap().entry(url.to_string()).or_default().push_back(scripted);
    }

    /// URLs requested so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().unwrap().clone()
    }

    fn next(&self, url: &str) -> Option<Scripted> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(url)?;
        if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn exchange(&self, request: &Request, cancel: CancellationToken) -> Result<Response, Error> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        self.tokens.lock().unwrap().push(cancel);

        let Some(scripted) = self.next(&url) else {
            return Err(Error::Network(format!("no route to {url}")));
        };

        tokio::time::sleep(scripted.delay).await;

        if scripted.refuse {
            return Err(Error::Network(format!("connection refused: {url}")));
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(scripted.content_type));
        Ok(Response {
            url: request.url.clone(),
            status: StatusCode::from_u16(scripted.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers,
            body: Bytes::from(scripted.body),
            source: Source::Network,
        })
    }
}
