//! Bounded, delay-free retry wrapper around a single logical fetch.
//!
//! Retries are immediate and capped by a fixed attempt count chosen at call
//! time. No backoff is applied: the contract is "bounded attempts, then
//! surface the real result", and a replacement adding backoff must keep it.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::response::PollResponse;
use crate::transport::{PollRequest, Transport, TransportError};

/// Remaining-attempts counter for one `retrying_fetch` invocation.
///
/// The counter can only decrease and never goes below zero; `cancel` zeroes
/// it so a retry-in-progress stops after its current attempt.
#[derive(Debug)]
pub struct RetryBudget {
    remaining: AtomicU32,
}

impl RetryBudget {
    pub fn new(attempts: u32) -> Self {
        Self {
            remaining: AtomicU32::new(attempts),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Takes one attempt from the budget. Returns false when exhausted.
    pub fn try_consume(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn cancel(&self) {
        self.remaining.store(0, Ordering::SeqCst);
    }
}

/// Cancellation handle returned alongside the pending retrying fetch.
#[derive(Clone, Debug)]
pub struct RetryHandle {
    budget: Arc<RetryBudget>,
}

impl RetryHandle {
    /// Prevents further retry attempts. The attempt already in flight is
    /// not aborted; its result is returned as-is.
    pub fn stop_retrying(&self) {
        self.budget.cancel();
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.budget.remaining()
    }
}

/// Wraps one logical fetch with up to `attempts` additional tries.
///
/// A timed-out attempt is substituted with a synthetic not-ok response so
/// the retry decision below treats it like any other failed status; every
/// other transport error propagates immediately without retrying. A not-ok
/// response retries while the budget lasts, then is returned as-is.
pub fn retrying_fetch(
    transport: Arc<dyn Transport>,
    request: PollRequest,
    attempts: u32,
) -> (
    impl Future<Output = Result<PollResponse, TransportError>>,
    RetryHandle,
) {
    let budget = Arc::new(RetryBudget::new(attempts));
    let handle = RetryHandle {
        budget: Arc::clone(&budget),
    };

    let fetch = async move {
        loop {
            let response = match transport.fetch(&request).await {
                Ok(response) => response,
                Err(err) if err.is_timeout() => PollResponse::synthetic_timeout(),
                Err(err) => return Err(err),
            };

            if !response.is_ok() && budget.try_consume() {
                debug!(
                    url = %request.url,
                    status = response.status().as_u16(),
                    remaining = budget.remaining(),
                    "retrying failed fetch"
                );
                continue;
            }

            return Ok(response);
        }
    };

    (fetch, handle)
}
