use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use crate::error::BoxError;
use crate::events::Emitter;
use crate::response::Body;
use crate::transport::Transport;

/// Default per-attempt timeout budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4_000);

/// Default interval between scheduled fetch cycles.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(60_000);

pub(crate) type ParseFuture<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;
pub(crate) type ParseFn<T> = Arc<dyn Fn(Body) -> ParseFuture<T> + Send + Sync>;

/// Configuration for a [`Poller<T>`](crate::Poller), supplied once at
/// construction and immutable afterwards.
///
/// Only the URL is required:
///
/// ```no_run
/// use pollcell_http::{Poller, PollerConfig};
///
/// # fn build() -> pollcell_http::Result<()> {
/// let poller = Poller::new(PollerConfig::new("https://example.com/feed"))?;
/// # Ok(())
/// # }
/// ```
///
/// `parse_data` changes the cached type, so call it before the
/// type-dependent options (`default_data`, `emitter`):
///
/// ```no_run
/// use pollcell_http::{Body, PollerConfig};
///
/// let config = PollerConfig::new("https://example.com/feed")
///     .parse_data(|body: Body| {
///         let value = body.as_json().ok_or("expected a JSON body")?;
///         Ok(value["items"].as_array().map(Vec::len).unwrap_or(0))
///     })
///     .default_data(0);
/// ```
pub struct PollerConfig<T = Body> {
    pub(crate) url: String,
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) timeout: Duration,
    pub(crate) retry: u32,
    pub(crate) refresh_interval: Duration,
    pub(crate) parse: ParseFn<T>,
    pub(crate) default_data: Option<T>,
    pub(crate) autostart: bool,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) emitter: Option<Arc<dyn Emitter<T>>>,
}

impl PollerConfig<Body> {
    /// Starts a configuration polling `url`, with the decoded body cached
    /// as-is (identity `parse_data`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: 0,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            parse: Arc::new(|body| Box::pin(std::future::ready(Ok(body)))),
            default_data: None,
            autostart: false,
            transport: None,
            emitter: None,
        }
    }
}

impl<T> PollerConfig<T> {
    /// HTTP method for every fetch. Defaults to GET.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a request header. `Accept` and, for body-carrying methods,
    /// `Content-Type` are defaulted to `application/json` at construction
    /// unless set here.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Per-attempt timeout budget. Defaults to [`DEFAULT_TIMEOUT`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of additional attempts after a not-ok response or timeout.
    /// Zero (the default) means a single plain fetch per cycle.
    pub fn retry(mut self, attempts: u32) -> Self {
        self.retry = attempts;
        self
    }

    /// Interval between scheduled fetch cycles.
    /// Defaults to [`DEFAULT_REFRESH_INTERVAL`].
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Value served by [`get_data`](crate::Poller::get_data) until the
    /// first successful fetch. Never overwritten by a failure.
    pub fn default_data(mut self, value: T) -> Self {
        self.default_data = Some(value);
        self
    }

    /// Starts the poller (with an immediate first fetch) from the
    /// constructor. Requires construction inside a Tokio runtime.
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Injects the fetch capability. Defaults to
    /// [`HttpTransport`](crate::HttpTransport).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Injects the event-delivery capability. Defaults to an in-memory
    /// [`EventBus`](crate::EventBus).
    pub fn emitter(mut self, emitter: Arc<dyn Emitter<T>>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Synchronous body parser producing the cached type.
    ///
    /// Resets `default_data` and any injected emitter, since both are typed
    /// by the parser's output.
    pub fn parse_data<U, F>(self, parse: F) -> PollerConfig<U>
    where
        U: Send + 'static,
        F: Fn(Body) -> Result<U, BoxError> + Send + Sync + 'static,
    {
        self.with_parse(Arc::new(move |body| {
            Box::pin(std::future::ready(parse(body)))
        }))
    }

    /// Asynchronous body parser; the cycle awaits it before caching and
    /// emitting `Data`.
    pub fn parse_data_async<U, F, Fut>(self, parse: F) -> PollerConfig<U>
    where
        F: Fn(Body) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, BoxError>> + Send + 'static,
    {
        self.with_parse(Arc::new(move |body| Box::pin(parse(body))))
    }

    fn with_parse<U>(self, parse: ParseFn<U>) -> PollerConfig<U> {
        PollerConfig {
            url: self.url,
            method: self.method,
            headers: self.headers,
            timeout: self.timeout,
            retry: self.retry,
            refresh_interval: self.refresh_interval,
            parse,
            default_data: None,
            autostart: self.autostart,
            transport: self.transport,
            emitter: None,
        }
    }
}
