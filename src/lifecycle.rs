//! Process lifecycle phase tracking.
//!
//! The service moves through `NotStarted -> Running -> Draining -> Stopped`.
//! Transitions only go forward. The phase is published over a `watch` channel
//! so request middleware and the readiness probe can read it without locking.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle phase of the running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    NotStarted,
    Running,
    Draining,
    Stopped,
}

impl Phase {
    /// Whether new requests may still be admitted.
    pub fn accepts_requests(self) -> bool {
        matches!(self, Phase::NotStarted | Phase::Running)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::NotStarted => "NOT_STARTED",
            Phase::Running => "RUNNING",
            Phase::Draining => "DRAINING",
            Phase::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },
}

/// Shared handle to the current phase. Cheap to clone.
#[derive(Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<Phase>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::NotStarted);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Move forward to `next`, returning the previous phase.
    pub fn advance(&self, next: Phase) -> Result<Phase, LifecycleError> {
        let mut observed = next;
        let modified = self.tx.send_if_modified(|phase| {
            observed = *phase;
            if next > *phase {
                *phase = next;
                true
            } else {
                false
            }
        });

        if !modified {
            return Err(LifecycleError::InvalidTransition {
                from: observed,
                to: next,
            });
        }

        tracing::info!(from = %observed, to = %next, "Lifecycle transition");
        Ok(observed)
    }

    /// Receiver that observes every subsequent transition.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("phase", &self.current())
            .finish()
    }
}
