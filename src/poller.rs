use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::config::{ParseFn, PollerConfig};
use crate::error::{HttpError, PollError};
use crate::events::{Emitter, EventBus, EventKind, PollEvent};
use crate::response::PollResponse;
use crate::retry::retrying_fetch;
use crate::state::{CycleOutcome, PollState};
use crate::transport::{HttpTransport, PollRequest, Transport};

/// Options for [`Poller::start`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StartOptions {
    /// Run one fetch cycle immediately instead of waiting a full interval
    /// for the first scheduled tick.
    pub initial_request: bool,
}

impl StartOptions {
    /// Shorthand for `StartOptions { initial_request: true }`.
    pub fn initial_request() -> Self {
        Self {
            initial_request: true,
        }
    }
}

/// Result of one fetch cycle, before it settles into state and events.
enum FetchOutcome<T> {
    Ok { value: T },
    Failed(PollError),
}

/// Recurring-poll data source: fetches a URL on an interval, caches the
/// latest good value and reports freshness through events.
///
/// Cheap to clone; clones share the same cache, state and schedule.
///
/// Scheduled cycles are spawned independently, so when the refresh interval
/// is shorter than the observed latency (or [`retry`](Poller::retry) fires
/// during an in-flight cycle) several cycles can be outstanding at once.
/// Their completions race and the last writer wins the final state, cached
/// value and event order. Downstream code may rely on this, so the poller
/// deliberately does not serialize cycles.
pub struct Poller<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Poller<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Poller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("url", &self.inner.request.url.as_str())
            .field("method", &self.inner.request.method)
            .field("refresh_interval", &self.inner.refresh_interval)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

struct Inner<T> {
    request: PollRequest,
    retry: u32,
    refresh_interval: Duration,
    parse: ParseFn<T>,
    transport: Arc<dyn Transport>,
    emitter: Arc<dyn Emitter<T>>,
    state: RwLock<PollState>,
    data: RwLock<Option<T>>,
    last_error: RwLock<Option<Arc<PollError>>>,
    /// Present iff the poller is scheduled.
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Poller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Validates the configuration and builds the poller in the `Initial`
    /// state, serving `default_data`.
    ///
    /// Fails with [`PollError::Config`] when the URL is empty or does not
    /// parse. With `autostart` set, also begins polling (initial fetch
    /// included); construction must then happen inside a Tokio runtime.
    pub fn new(config: PollerConfig<T>) -> crate::Result<Poller<T>> {
        if config.url.trim().is_empty() {
            return Err(PollError::Config("a url is required".to_owned()));
        }
        let url = reqwest::Url::parse(&config.url)
            .map_err(|err| PollError::Config(format!("invalid url `{}`: {err}", config.url)))?;

        let request = PollRequest {
            url,
            method: config.method.clone(),
            headers: normalize_headers(config.headers, &config.method),
            timeout: config.timeout,
        };

        let poller = Poller {
            inner: Arc::new(Inner {
                request,
                retry: config.retry,
                refresh_interval: config.refresh_interval,
                parse: config.parse,
                transport: config
                    .transport
                    .unwrap_or_else(|| Arc::new(HttpTransport::new())),
                emitter: config.emitter.unwrap_or_else(|| Arc::new(EventBus::new())),
                state: RwLock::new(PollState::Initial),
                data: RwLock::new(config.default_data),
                last_error: RwLock::new(None),
                ticker: Mutex::new(None),
            }),
        };

        if config.autostart {
            let autostarted = poller.clone();
            tokio::spawn(async move {
                if let Err(err) = autostarted.start(StartOptions::initial_request()).await {
                    error!(error = %err, "poller autostart failed");
                }
            });
        }

        Ok(poller)
    }

    /// Whether a repeating schedule is currently installed.
    pub fn is_running(&self) -> bool {
        self.inner
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Installs the repeating schedule and, when requested, runs one fetch
    /// cycle immediately.
    ///
    /// The schedule is installed (and `is_running` turns true) before the
    /// initial cycle is awaited; the returned future resolves once that
    /// cycle settles. Cycle failures are delivered through the `Error`
    /// event and never fail `start`.
    pub async fn start(&self, opts: StartOptions) -> crate::Result<()> {
        let initial = {
            let mut ticker = self
                .inner
                .ticker
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if ticker.is_some() {
                return Err(PollError::AlreadyRunning);
            }
            let initial = opts.initial_request.then(|| self.spawn_cycle());
            *ticker = Some(self.spawn_ticker());
            initial
        };

        if let Some(cycle) = initial {
            // JoinError only surfaces task aborts; the cycle itself cannot
            // fail outward.
            let _ = cycle.await;
        }
        Ok(())
    }

    /// Cancels the repeating schedule. Idempotent.
    ///
    /// Only scheduling stops: in-flight cycles run to completion, the state
    /// and cached value stay as they are.
    pub fn stop(&self) {
        let handle = self
            .inner
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Runs one fetch cycle now and restarts the schedule from this call,
    /// so the next scheduled tick lands a full interval later.
    ///
    /// Does not require the poller to be running; afterwards it is.
    /// Resolves once the immediate cycle settles.
    pub async fn retry(&self) {
        let cycle = self.spawn_cycle();
        {
            let mut ticker = self
                .inner
                .ticker
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(old) = ticker.take() {
                old.abort();
            }
            *ticker = Some(self.spawn_ticker());
        }
        let _ = cycle.await;
    }

    /// The current cached value: `default_data` until a fetch succeeds,
    /// then the latest parsed value. Never triggers a fetch.
    pub fn get_data(&self) -> Option<T> {
        self.inner
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current freshness state.
    pub fn state(&self) -> PollState {
        *self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The error held since the most recent failed cycle, if any. Cleared
    /// as soon as a cycle classifies its response as ok.
    pub fn last_error(&self) -> Option<Arc<PollError>> {
        self.inner
            .last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribes a handler to every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&PollEvent<T>) + Send + Sync + 'static,
    {
        self.inner.emitter.on(kind, Box::new(handler));
    }

    /// Subscribes a handler that fires at most one time.
    pub fn once<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&PollEvent<T>) + Send + Sync + 'static,
    {
        self.inner.emitter.once(kind, Box::new(handler));
    }

    /// One complete fetch cycle: transport call, classification, cache and
    /// state update, event emission.
    ///
    /// Always resolves; every failure becomes an `Error` event plus a state
    /// transition. A single bad response must never take the host down.
    pub async fn fetch(&self) {
        let started = Instant::now();
        match self.run_cycle(started).await {
            FetchOutcome::Ok { value } => self.settle_success(value),
            FetchOutcome::Failed(err) => self.settle_failure(err),
        }
    }

    async fn run_cycle(&self, started: Instant) -> FetchOutcome<T> {
        let response = if self.inner.retry > 0 {
            let (fetch, _handle) = retrying_fetch(
                Arc::clone(&self.inner.transport),
                self.inner.request.clone(),
                self.inner.retry,
            );
            fetch.await
        } else {
            self.inner.transport.fetch(&self.inner.request).await
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => return FetchOutcome::Failed(PollError::Transport(err)),
        };

        if !response.is_ok() {
            let err = HttpError::new(
                self.inner.request.url.clone(),
                self.inner.request.method.clone(),
                response,
            );
            return FetchOutcome::Failed(PollError::Http(err));
        }

        let latency = started.elapsed();
        self.clear_last_error();
        self.emit_ok(response.clone(), latency);

        let body = match response.decode_body() {
            Ok(body) => body,
            Err(err) => return FetchOutcome::Failed(err),
        };

        match (self.inner.parse)(body).await {
            Ok(value) => FetchOutcome::Ok { value },
            Err(err) => FetchOutcome::Failed(PollError::Parse(err)),
        }
    }

    fn emit_ok(&self, response: PollResponse, latency: Duration) {
        debug!(
            url = %self.inner.request.url,
            status = response.status().as_u16(),
            latency_ms = latency.as_millis() as u64,
            "poll fetch ok"
        );
        self.inner.emitter.emit(&PollEvent::Ok { response, latency });
    }

    fn settle_success(&self, value: T) {
        {
            let mut data = self
                .inner
                .data
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *data = Some(value.clone());
        }
        {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *state = state.next(CycleOutcome::Success);
        }
        self.inner.emitter.emit(&PollEvent::Data(value));
    }

    fn settle_failure(&self, err: PollError) {
        let err = Arc::new(err);
        let next = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let next = state.next(CycleOutcome::Failure);
            *state = next;
            next
        };

        match next {
            PollState::Stale => warn!(
                event = "POLLER_DATA_STALE",
                url = %self.inner.request.url,
                error = %err,
                "poller is serving stale data; it was unable to fetch fresh data"
            ),
            _ => error!(
                event = "POLLER_DATA_DEFAULT",
                url = %self.inner.request.url,
                error = %err,
                "poller is serving default data; it was unable to fetch fresh data"
            ),
        }

        {
            let mut last_error = self
                .inner
                .last_error
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *last_error = Some(Arc::clone(&err));
        }
        self.inner.emitter.emit(&PollEvent::Error(err));
    }

    fn clear_last_error(&self) {
        let mut last_error = self
            .inner
            .last_error
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *last_error = None;
    }

    fn spawn_cycle(&self) -> JoinHandle<()> {
        let cycle = self.clone();
        tokio::spawn(async move { cycle.fetch().await })
    }

    /// Repeating timer task. The first tick fires one full interval after
    /// installation; each tick spawns its cycle as an independent task so a
    /// slow fetch never delays the schedule.
    fn spawn_ticker(&self) -> JoinHandle<()> {
        let poller = self.clone();
        let period = self.inner.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let _ = poller.spawn_cycle();
            }
        })
    }
}

/// Fills in the header defaults the poller has always assumed: JSON is the
/// expected interchange format unless the caller says otherwise.
fn normalize_headers(
    mut headers: reqwest::header::HeaderMap,
    method: &reqwest::Method,
) -> reqwest::header::HeaderMap {
    use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
    use reqwest::Method;

    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    }

    let carries_body =
        *method == Method::POST || *method == Method::PUT || *method == Method::PATCH;
    if carries_body && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    headers
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
    use reqwest::Method;

    use super::normalize_headers;
    use crate::{PollError, Poller, PollerConfig};

    #[test]
    fn construction_requires_a_url() {
        let err = Poller::new(PollerConfig::new("")).expect_err("empty url must fail");
        assert!(matches!(err, PollError::Config(_)));

        let err = Poller::new(PollerConfig::new("   ")).expect_err("blank url must fail");
        assert!(matches!(err, PollError::Config(_)));
    }

    #[test]
    fn construction_rejects_unparseable_urls() {
        let err = Poller::new(PollerConfig::new("not a url")).expect_err("must fail");
        assert!(matches!(err, PollError::Config(_)));
    }

    #[test]
    fn debug_output_names_the_polled_url() {
        let poller = Poller::new(PollerConfig::new("http://localhost/metrics")).unwrap();
        let rendered = format!("{poller:?}");
        assert!(rendered.contains("http://localhost/metrics"));
        assert!(rendered.contains("Poller"));
    }

    #[test]
    fn accept_header_defaults_to_json() {
        let headers = normalize_headers(HeaderMap::new(), &Method::GET);
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn content_type_defaults_only_for_body_carrying_methods() {
        let headers = normalize_headers(HeaderMap::new(), &Method::POST);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");

        let headers = normalize_headers(HeaderMap::new(), &Method::PUT);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");

        let headers = normalize_headers(HeaderMap::new(), &Method::DELETE);
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn explicit_headers_are_not_overwritten() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/csv"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        let headers = normalize_headers(headers, &Method::POST);
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/csv");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/csv");
    }
}
