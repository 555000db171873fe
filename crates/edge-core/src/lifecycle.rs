//! Worker lifecycle and per-request fetch state tracking.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::context::FetchRequest;

/// Lifecycle signals delivered by the host.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A new worker version is being installed.
    Install,
    /// The installed worker is taking over.
    Activate,
    /// A request was intercepted.
    Fetch(FetchRequest),
}

impl LifecycleEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
        }
    }
}

/// Lifecycle state of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Script evaluated, nothing installed yet.
    Parsed,
    /// Install is running (precache in flight).
    Installing,
    /// Install finished; waiting to activate.
    Installed,
    /// Activate is running (eviction in flight).
    Activating,
    /// Serving fetches from the current generation.
    Activated,
    /// Install failed; this instance will never serve.
    Redundant,
}

impl WorkerState {
    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (Self::Parsed, Self::Installing)
                | (Self::Installing, Self::Installed)
                | (Self::Installing, Self::Redundant)
                | (Self::Installed, Self::Activating)
                | (Self::Activating, Self::Activated)
        )
    }

    /// Whether fetches may use the cache in this state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Redundant => write!(f, "redundant"),
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Cache => write!(f, "cache"),
        }
    }
}

/// Per-request network-first state.
///
/// `Pending → NetworkAttempted → {Served(Network), Served(Cache), Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Pending,
    NetworkAttempted,
    Served(ResponseSource),
    Failed,
}

/// Error for an illegal fetch state transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal fetch transition {from:?} -> {to:?}")]
pub struct InvalidFetchTransition {
    pub from: FetchState,
    pub to: FetchState,
}

impl FetchState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Served(_) | Self::Failed)
    }

    /// Advance to `next`, rejecting anything outside the state machine.
    pub fn advance(self, next: FetchState) -> Result<FetchState, InvalidFetchTransition> {
        let legal = matches!(
            (self, next),
            (Self::Pending, Self::NetworkAttempted)
                | (Self::NetworkAttempted, Self::Served(_))
                | (Self::NetworkAttempted, Self::Failed)
        );

        if legal {
            Ok(next)
        } else {
            Err(InvalidFetchTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Timing marks for a single fetch.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<&'static str, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &'static str) {
        self.marks.insert(name, Instant::now());
    }

    /// Time from start to a recorded mark.
    pub fn until(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}
