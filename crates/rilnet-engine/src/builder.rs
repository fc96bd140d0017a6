//! NetworkBuilder -- fluent builder for constructing [`RilNetwork`]
//! instances.
//!
//! Separates per-slot configuration (wire codes, timeouts, data-profile
//! policy, vendor hooks) from construction, so modem glue can set up a
//! slot before wiring it to a transport.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rilnet_core::{AccessModes, RilIo};
//! use rilnet_engine::builder::NetworkBuilder;
//! use rilnet_engine::gprs::GprsWatch;
//! use rilnet_engine::radio::Radio;
//! use rilnet_engine::sim::{SimCard, SimSettings};
//!
//! # fn example(io: Arc<dyn RilIo>) {
//! let network = NetworkBuilder::new()
//!     .log_prefix("ril0")
//!     .use_data_profiles(true)
//!     .build(
//!         io,
//!         Radio::new(),
//!         SimCard::new(),
//!         SimSettings::new(AccessModes::all()),
//!         GprsWatch::new(),
//!     );
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use rilnet_core::RilIo;

use crate::config::NetworkConfig;
use crate::gprs::GprsWatch;
use crate::network::{Engine, NetworkSnapshot, RilNetwork};
use crate::radio::Radio;
use crate::sim::{SimCard, SimSettings};
use crate::vendor::VendorAdapter;

/// Capacity of the handle-to-engine command channel.
const COMMAND_QUEUE: usize = 16;

/// Capacity of the change-event broadcast channel.
const EVENT_QUEUE: usize = 32;

/// Fluent builder for [`RilNetwork`].
///
/// All configuration has defaults from [`NetworkConfig`], so the
/// simplest usage is `NetworkBuilder::new().build(...)`.
pub struct NetworkBuilder {
    config: NetworkConfig,
    vendor: Option<Arc<dyn VendorAdapter>>,
}

impl NetworkBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        NetworkBuilder {
            config: NetworkConfig::default(),
            vendor: None,
        }
    }

    /// Wire code submitted when the policy lands on LTE.
    pub fn lte_network_mode(mut self, rat: i32) -> Self {
        self.config.lte_network_mode = rat;
        self
    }

    /// Wire code submitted when the policy lands on UMTS.
    pub fn umts_network_mode(mut self, rat: i32) -> Self {
        self.config.umts_network_mode = rat;
        self
    }

    /// Response timeout for set-preferred-network-type requests.
    pub fn network_mode_timeout(mut self, timeout: Duration) -> Self {
        self.config.network_mode_timeout = timeout;
        self
    }

    /// Keep the peer's data profile list in sync with provisioned
    /// contexts (off by default).
    pub fn use_data_profiles(mut self, enabled: bool) -> Self {
        self.config.use_data_profiles = enabled;
        self
    }

    /// Profile id used for the MMS data profile.
    pub fn mms_data_profile_id(mut self, id: i32) -> Self {
        self.config.mms_data_profile_id = id;
        self
    }

    /// Slot prefix attached to every log line of this engine.
    pub fn log_prefix(mut self, prefix: &str) -> Self {
        self.config.log_prefix = prefix.to_owned();
        self
    }

    /// Vendor adapter for peers that want vendor-specific requests.
    pub fn vendor(mut self, vendor: Arc<dyn VendorAdapter>) -> Self {
        self.vendor = Some(vendor);
        self
    }

    /// Spawn the engine task and return its handle.
    ///
    /// The engine immediately queries the peer's preferred mode and,
    /// when the radio is already powered on, polls registration state.
    pub fn build(
        self,
        io: Arc<dyn RilIo>,
        radio: Radio,
        sim: SimCard,
        settings: SimSettings,
        gprs: GprsWatch,
    ) -> RilNetwork {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, _) = broadcast::channel(EVENT_QUEUE);
        let (snap_tx, snap_rx) = watch::channel(NetworkSnapshot::default());
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let span = tracing::info_span!("ril-network", slot = %self.config.log_prefix);
        let engine = Engine::new(
            io,
            radio,
            sim,
            settings,
            gprs,
            self.vendor,
            self.config,
            event_tx.clone(),
            snap_tx,
            done_tx,
        );
        let task = tokio::spawn(engine.run(cmd_rx, done_rx, cancel.clone()).instrument(span));

        RilNetwork::new(cmd_tx, event_tx, snap_rx, cancel, task)
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
