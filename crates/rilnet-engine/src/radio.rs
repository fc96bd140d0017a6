//! Radio power-state source.
//!
//! The radio collaborator owns modem power management; the engine only
//! observes it. [`Radio`] is a cheaply-cloneable shared handle: modem
//! glue (or a test) publishes state through it, and the engine
//! subscribes to the change stream. Publishing only wakes subscribers
//! when a field actually changed.

use std::sync::Arc;

use tokio::sync::watch;

use rilnet_core::RadioState;

/// Snapshot of the radio collaborator's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioStatus {
    /// Power state of the modem.
    pub state: RadioState,
    /// Whether the modem is online (set online after power-on
    /// handshakes complete).
    pub online: bool,
}

/// Shared handle to the radio power-state source.
#[derive(Clone)]
pub struct Radio {
    tx: Arc<watch::Sender<RadioStatus>>,
}

impl Radio {
    /// Create a source reporting a powered-off, offline radio.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RadioStatus {
            state: RadioState::Off,
            online: false,
        });
        Radio { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    pub fn status(&self) -> RadioStatus {
        *self.tx.borrow()
    }

    /// Publish a new power state.
    pub fn set_state(&self, state: RadioState) {
        self.tx.send_if_modified(|s| {
            if s.state != state {
                s.state = state;
                true
            } else {
                false
            }
        });
    }

    /// Publish a new online flag.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|s| {
            if s.online != online {
                s.online = online;
                true
            } else {
                false
            }
        });
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<RadioStatus> {
        self.tx.subscribe()
    }
}

impl Default for Radio {
    fn default() -> Self {
        Self::new()
    }
}
