//! SIM card and SIM settings sources.
//!
//! Two separate collaborators: [`SimCard`] tracks the physical card
//! (ready state, whether SIM I/O is in progress), [`SimSettings`]
//! tracks per-subscription settings (IMSI, user-preferred mode, and
//! the technology capability mask). Both are shared handles over watch
//! channels, same shape as [`Radio`](crate::radio::Radio).

use std::sync::Arc;

use tokio::sync::watch;

use rilnet_core::{AccessModes, RadioAccessMode};

/// Snapshot of the SIM card state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimStatus {
    /// Whether the card is present and ready.
    pub ready: bool,
    /// Whether SIM I/O is currently in progress. Setting the preferred
    /// mode while I/O is active starves SIM traffic on some peers.
    pub io_active: bool,
}

/// Shared handle to the SIM card source.
#[derive(Clone)]
pub struct SimCard {
    tx: Arc<watch::Sender<SimStatus>>,
}

impl SimCard {
    /// Create a source reporting no ready card.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SimStatus {
            ready: false,
            io_active: false,
        });
        SimCard { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    pub fn status(&self) -> SimStatus {
        *self.tx.borrow()
    }

    /// Publish card readiness.
    pub fn set_ready(&self, ready: bool) {
        self.tx.send_if_modified(|s| {
            if s.ready != ready {
                s.ready = ready;
                true
            } else {
                false
            }
        });
    }

    /// Publish SIM I/O activity.
    pub fn set_io_active(&self, io_active: bool) {
        self.tx.send_if_modified(|s| {
            if s.io_active != io_active {
                s.io_active = io_active;
                true
            } else {
                false
            }
        });
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SimStatus> {
        self.tx.subscribe()
    }
}

impl Default for SimCard {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the per-subscription settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSettingsSnapshot {
    /// IMSI of the current subscription, when known.
    pub imsi: Option<String>,
    /// User-preferred access mode.
    pub pref_mode: RadioAccessMode,
    /// Technology capability mask of this slot.
    pub techs: AccessModes,
}

/// Shared handle to the SIM settings source.
#[derive(Clone)]
pub struct SimSettings {
    tx: Arc<watch::Sender<SimSettingsSnapshot>>,
}

impl SimSettings {
    /// Create a settings source for a slot with the given capability
    /// mask. The initial preferred mode is the best mode the mask
    /// allows.
    pub fn new(techs: AccessModes) -> Self {
        let (tx, _) = watch::channel(SimSettingsSnapshot {
            imsi: None,
            pref_mode: default_pref_mode(techs),
            techs,
        });
        SimSettings { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SimSettingsSnapshot {
        self.tx.borrow().clone()
    }

    /// Publish a new user preference.
    pub fn set_pref_mode(&self, mode: RadioAccessMode) {
        self.tx.send_if_modified(|s| {
            if s.pref_mode != mode {
                s.pref_mode = mode;
                true
            } else {
                false
            }
        });
    }

    /// Publish a new IMSI (or `None` when the subscription goes away).
    pub fn set_imsi(&self, imsi: Option<String>) {
        self.tx.send_if_modified(|s| {
            if s.imsi != imsi {
                s.imsi = imsi;
                true
            } else {
                false
            }
        });
    }

    /// Subscribe to settings changes.
    pub fn subscribe(&self) -> watch::Receiver<SimSettingsSnapshot> {
        self.tx.subscribe()
    }
}

/// Best mode a capability mask allows; GSM when the mask is empty.
fn default_pref_mode(techs: AccessModes) -> RadioAccessMode {
    if techs.contains(RadioAccessMode::Lte) {
        RadioAccessMode::Lte
    } else if techs.contains(RadioAccessMode::Umts) {
        RadioAccessMode::Umts
    } else {
        RadioAccessMode::Gsm
    }
}
