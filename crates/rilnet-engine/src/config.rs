//! Engine configuration.

use std::time::Duration;

use rilnet_core::profile_id;

use crate::rat;

/// Per-slot network engine configuration.
///
/// Defaults match what the common LTE-capable single-SIM setup wants;
/// multi-SIM products override the wire codes and profile ids per slot.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Wire code submitted when the policy lands on LTE.
    pub lte_network_mode: i32,
    /// Wire code submitted when the policy lands on UMTS.
    pub umts_network_mode: i32,
    /// Response timeout for set-preferred-network-type requests; some
    /// peers take a long time to retune.
    pub network_mode_timeout: Duration,
    /// Whether to keep the peer's data profile list in sync with the
    /// provisioned contexts.
    pub use_data_profiles: bool,
    /// Profile id used for the MMS data profile.
    pub mms_data_profile_id: i32,
    /// Slot prefix attached to every log line of this engine.
    pub log_prefix: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            lte_network_mode: rat::LTE_GSM_WCDMA,
            umts_network_mode: rat::GSM_WCDMA_AUTO,
            network_mode_timeout: Duration::from_secs(20),
            use_data_profiles: false,
            mms_data_profile_id: profile_id::DEFAULT,
            log_prefix: String::new(),
        }
    }
}
