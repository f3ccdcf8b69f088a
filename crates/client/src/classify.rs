//! Request classification.
//!
//! Every intercepted request is assigned exactly one [`RequestClass`], which
//! decides the order of sources the router tries and the network deadline.

use offshelf_core::{AppConfig, Error};
use regex::{Regex, RegexBuilder};
use url::Url;

use crate::request::{Destination, Request};

/// Routing class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Sub-resource with a concrete destination (script, style, image...).
    Static,
    /// Script-initiated call to the origin API.
    Api,
    /// Top-level page navigation inside the single-page app.
    SpaNav,
    Other,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Static => "static",
            RequestClass::Api => "api",
            RequestClass::SpaNav => "spa_nav",
            RequestClass::Other => "other",
        }
    }
}

/// Pure request classifier.
///
/// Patterns are compiled once, case-insensitively; `classify` holds no state
/// between calls.
#[derive(Debug, Clone)]
pub struct Classifier {
    api: Regex,
    static_exception: Regex,
}

impl Classifier {
    /// Build a classifier from the API host pattern and the pattern of static
    /// assets served from that host.
    pub fn new(api_pattern: &str, static_exception_pattern: &str) -> Result<Self, Error> {
        let compile = |field: &str, pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::InvalidInput(format!("{field}: {e}")))
        };

        Ok(Self {
            api: compile("api_pattern", api_pattern)?,
            static_exception: compile("static_exception_pattern", static_exception_pattern)?,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(&config.api_pattern, &config.static_exception_pattern)
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        match &request.destination {
            Destination::Unknown => RequestClass::SpaNav,
            Destination::Empty => {
                let url = request.url.as_str();
                if self.api.is_match(url) && !self.static_exception.is_match(url) {
                    RequestClass::Api
                } else {
                    RequestClass::Other
                }
            }
            _ => RequestClass::Static,
        }
    }

    /// Whether `url` points at the origin API host, regardless of destination.
    ///
    /// Used to pick which responses get written back and which cache entries
    /// the staleness sweep inspects.
    pub fn is_api_host(&self, url: &Url) -> bool {
        self.api.is_match(url.as_str())
    }
}
