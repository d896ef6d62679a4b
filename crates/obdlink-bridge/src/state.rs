//! Shared bridge state.
//!
//! One `BridgeState` is injected into the poller and anything that reports
//! status; there are no free-floating globals. Status transitions are
//! published over a watch channel so late subscribers always see the
//! current phase.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// The bridge's current phase, in the order a session moves through them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Status {
    /// Nothing started yet.
    Idle,
    /// Dialing the adapter and/or broker.
    Connecting,
    /// Adapter connected, provisioning not yet complete.
    Connected,
    /// Platform resource provisioning in progress.
    Provisioning,
    /// Provisioned and publishing telemetry.
    Ready,
    /// Stopped by request.
    Stopped,
    /// Stopped with an error.
    Error(String),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Provisioning => write!(f, "setting up platform resources"),
            Self::Ready => write!(f, "ready, publishing telemetry"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Process-wide session state with an explicit lifecycle.
pub struct BridgeState {
    status_tx: watch::Sender<Status>,
    running: AtomicBool,
}

impl BridgeState {
    /// Create state in the [`Status::Idle`] phase.
    pub fn new() -> Arc<Self> {
        let (status_tx, _) = watch::channel(Status::Idle);
        Arc::new(Self {
            status_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Publish a status transition.
    ///
    /// Reporting is the subscribers' job; whoever owns the feedback surface
    /// consumes [`subscribe`](Self::subscribe) and renders transitions there.
    pub fn set_status(&self, status: Status) {
        let _ = self.status_tx.send(status);
    }

    /// The current status.
    pub fn status(&self) -> Status {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Whether a polling session is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the polling session active or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}
