use serde::Serialize;

/// Freshness of the cached value across fetch cycles.
///
/// The machine has no terminal state: [`Poller::stop`](crate::Poller::stop)
/// halts scheduling but leaves the state untouched.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    /// No fetch cycle has completed yet.
    Initial,
    /// The cached value reflects the most recent fetch, which succeeded.
    Fresh,
    /// A past fetch succeeded but the most recent one failed; the cached
    /// value is from the earlier success.
    Stale,
    /// No fetch has ever succeeded; the cached value is still the
    /// configured default.
    Erroring,
}

/// How a single fetch cycle ended, for the purpose of a state transition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    Success,
    Failure,
}

impl PollState {
    /// Total transition function applied at the end of every fetch cycle.
    ///
    /// Any success lands in [`PollState::Fresh`]. A failure keeps the poller
    /// in [`PollState::Erroring`] until a first success has ever happened,
    /// and degrades to [`PollState::Stale`] afterwards.
    pub fn next(self, outcome: CycleOutcome) -> PollState {
        match (self, outcome) {
            (_, CycleOutcome::Success) => PollState::Fresh,
            (PollState::Initial | PollState::Erroring, CycleOutcome::Failure) => {
                PollState::Erroring
            }
            (PollState::Fresh | PollState::Stale, CycleOutcome::Failure) => PollState::Stale,
        }
    }

    /// Lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            PollState::Initial => "initial",
            PollState::Fresh => "fresh",
            PollState::Stale => "stale",
            PollState::Erroring => "erroring",
        }
    }
}
