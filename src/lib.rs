//! `pollcell-http` turns a remote, possibly-flaky HTTP resource into a
//! locally-readable, continuously-refreshed value.
//!
//! A [`Poller`] fetches a URL on a fixed interval, classifies each response,
//! caches the latest usable value and reports health through events:
//! - [`Poller::get_data`] - read the cached value, never fetches
//! - [`Poller::state`] - fresh, stale, erroring or initial
//! - [`Poller::on`] / [`Poller::once`] - subscribe to `Ok`/`Data`/`Error`
//!
//! ```no_run
//! use pollcell_http::{EventKind, Poller, PollerConfig, StartOptions};
//!
//! # async fn run() -> pollcell_http::Result<()> {
//! let poller = Poller::new(
//!     PollerConfig::new("https://example.com/feed")
//!         .refresh_interval(std::time::Duration::from_secs(30)),
//! )?;
//! poller.on(EventKind::Error, |event| eprintln!("poll failed: {event:?}"));
//! poller.start(StartOptions::initial_request()).await?;
//! let latest = poller.get_data();
//! # Ok(())
//! # }
//! ```
//!
//! The HTTP transport, the event delivery mechanism and the logger are
//! injected capabilities: see [`Transport`], [`Emitter`] and the `tracing`
//! facade for the defaults.

mod config;
mod error;
mod events;
mod poller;
mod response;
mod retry;
mod state;
mod transport;

pub use config::{PollerConfig, DEFAULT_REFRESH_INTERVAL, DEFAULT_TIMEOUT};
pub use error::{BoxError, HttpError, PollError};
pub use events::{Emitter, EventBus, EventKind, Handler, PollEvent};
pub use poller::{Poller, StartOptions};
pub use response::{Body, PollResponse};
pub use retry::{retrying_fetch, RetryBudget, RetryHandle};
pub use state::{CycleOutcome, PollState};
pub use transport::{HttpTransport, PollRequest, Transport, TransportError};

pub type Result<T> = std::result::Result<T, PollError>;
