//! GPRS context provider ("watch").
//!
//! Tracks whether a packet-data service is attached to the modem and
//! the settings of its provisioned contexts (internet and MMS). The
//! engine derives data profiles and the initial-attach APN from this
//! snapshot; it never writes back.

use std::sync::Arc;

use tokio::sync::watch;

use rilnet_core::{GprsContext, GprsContextType};

/// Snapshot of the GPRS context provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GprsSnapshot {
    /// Whether a packet-data service is attached.
    pub present: bool,
    /// Settings of the internet context, when configured.
    pub internet: Option<GprsContext>,
    /// Settings of the MMS context, when configured.
    pub mms: Option<GprsContext>,
}

impl GprsSnapshot {
    /// Settings of one context type.
    pub fn context(&self, context_type: GprsContextType) -> Option<&GprsContext> {
        match context_type {
            GprsContextType::Internet => self.internet.as_ref(),
            GprsContextType::Mms => self.mms.as_ref(),
        }
    }
}

/// Shared handle to the GPRS context provider.
#[derive(Clone)]
pub struct GprsWatch {
    tx: Arc<watch::Sender<GprsSnapshot>>,
}

impl GprsWatch {
    /// Create a provider with no attached service.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(GprsSnapshot::default());
        GprsWatch { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> GprsSnapshot {
        self.tx.borrow().clone()
    }

    /// Publish service attachment or detachment.
    pub fn set_present(&self, present: bool) {
        self.tx.send_if_modified(|s| {
            if s.present != present {
                s.present = present;
                true
            } else {
                false
            }
        });
    }

    /// Publish new settings for one context type (`None` clears them).
    pub fn set_context(&self, context_type: GprsContextType, ctx: Option<GprsContext>) {
        self.tx.send_if_modified(|s| {
            let slot = match context_type {
                GprsContextType::Internet => &mut s.internet,
                GprsContextType::Mms => &mut s.mms,
            };
            if *slot != ctx {
                *slot = ctx;
                true
            } else {
                false
            }
        });
    }

    /// Subscribe to provider changes.
    pub fn subscribe(&self) -> watch::Receiver<GprsSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for GprsWatch {
    fn default() -> Self {
        Self::new()
    }
}
