//! Lifecycle events and the injected emitter capability.
//!
//! The poller is observable through a subscribe/emit protocol regardless of
//! host environment: the core only talks to the [`Emitter`] trait, and the
//! host decides what backs it. [`EventBus`] is the built-in in-memory
//! implementation used when nothing is injected.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::response::PollResponse;
use crate::PollError;

/// Event emitted by a fetch cycle.
#[derive(Clone, Debug)]
pub enum PollEvent<T> {
    /// The fetch produced a 2xx response. Fires before body decoding, so it
    /// reports reachability and latency rather than data validity.
    Ok {
        response: PollResponse,
        latency: Duration,
    },
    /// A new value was parsed and cached.
    Data(T),
    /// The cycle failed; the cached value was left untouched.
    Error(Arc<PollError>),
}

/// Discriminant used when subscribing to a single event kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    Ok,
    Data,
    Error,
}

impl<T> PollEvent<T> {
    pub fn kind(&self) -> EventKind {
        match self {
            PollEvent::Ok { .. } => EventKind::Ok,
            PollEvent::Data(_) => EventKind::Data,
            PollEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Boxed event handler. Handlers run synchronously inside the emitting
/// fetch cycle and must not block.
pub type Handler<T> = Box<dyn Fn(&PollEvent<T>) + Send + Sync>;

/// Injected event-delivery capability with `on`/`once`/`emit` semantics.
pub trait Emitter<T>: Send + Sync {
    /// Subscribes a handler to every event of `kind`.
    fn on(&self, kind: EventKind, handler: Handler<T>);
    /// Subscribes a handler that fires at most one time.
    fn once(&self, kind: EventKind, handler: Handler<T>);
    /// Delivers an event to all matching subscribers.
    fn emit(&self, event: &PollEvent<T>);
}

struct Subscription<T> {
    kind: EventKind,
    once: bool,
    handler: Arc<dyn Fn(&PollEvent<T>) + Send + Sync>,
}

/// In-memory handler registry, the default emitter.
pub struct EventBus<T> {
    subscribers: Mutex<Vec<Subscription<T>>>,
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, kind: EventKind, once: bool, handler: Handler<T>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                kind,
                once,
                handler: Arc::from(handler),
            });
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Emitter<T> for EventBus<T> {
    fn on(&self, kind: EventKind, handler: Handler<T>) {
        self.push(kind, false, handler);
    }

    fn once(&self, kind: EventKind, handler: Handler<T>) {
        self.push(kind, true, handler);
    }

    fn emit(&self, event: &PollEvent<T>) {
        // Clone the matching handlers out under the lock, removing spent
        // `once` entries at the same time. Dispatch happens outside the lock
        // so a handler may subscribe re-entrantly and so overlapping emits
        // each see the full registry rather than a registry mid-dispatch.
        let kind = event.kind();
        let mut matching = Vec::new();
        {
            let mut guard = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.retain(|subscription| {
                if subscription.kind != kind {
                    return true;
                }
                matching.push(Arc::clone(&subscription.handler));
                !subscription.once
            });
        }

        for handler in matching {
            handler(event);
        }
    }
}
