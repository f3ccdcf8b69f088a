//! Request routing for offshelf.
//!
//! This crate provides the intercepted request model, the classifier, the
//! network stage with cancellable deadlines, the fallback router and the
//! install/activate lifecycle, wired together by [`ServiceWorker`].

pub mod classify;
pub mod fetch;
pub mod lifecycle;
pub mod request;
pub mod router;
pub mod status;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{Classifier, RequestClass};
pub use fetch::{FetchConfig, HttpUpstream, Timeout, Upstream, fetch_with_timeout};
pub use lifecycle::{ActivationReport, Lifecycle};
pub use request::{Destination, Request, Response, Source};
pub use router::{FallbackRouter, RouterConfig};
pub use status::NetworkStatus;
pub use worker::{ServiceWorker, WorkerState};
