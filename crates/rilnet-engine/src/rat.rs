//! Raw preferred-network-type codes and their access-mode buckets.
//!
//! The peer speaks in composite "preferred network type" codes; the
//! policy engine thinks in [`RadioAccessMode`] buckets. The bucket a
//! code belongs to is decided by the highest generation it enables.

use tracing::debug;

use rilnet_core::RadioAccessMode;

/// GSM + WCDMA, WCDMA preferred.
pub const GSM_WCDMA: i32 = 0;
/// GSM only.
pub const GSM_ONLY: i32 = 1;
/// WCDMA only.
pub const WCDMA: i32 = 2;
/// GSM + WCDMA, automatic.
pub const GSM_WCDMA_AUTO: i32 = 3;
/// LTE + CDMA/EvDo.
pub const LTE_CDMA_EVDO: i32 = 8;
/// LTE + GSM + WCDMA.
pub const LTE_GSM_WCDMA: i32 = 9;
/// LTE + CDMA/EvDo + GSM + WCDMA.
pub const LTE_CDMA_EVDO_GSM_WCDMA: i32 = 10;
/// LTE only.
pub const LTE_ONLY: i32 = 11;
/// LTE + WCDMA.
pub const LTE_WCDMA: i32 = 12;

/// Bucket a raw preferred-network-type code into an access mode.
///
/// Unexpected codes are logged and treated as GSM, the safe floor.
pub fn rat_to_mode(rat: i32) -> RadioAccessMode {
    match rat {
        LTE_CDMA_EVDO | LTE_GSM_WCDMA | LTE_CDMA_EVDO_GSM_WCDMA | LTE_ONLY | LTE_WCDMA => {
            RadioAccessMode::Lte
        }
        GSM_WCDMA_AUTO | WCDMA | GSM_WCDMA => RadioAccessMode::Umts,
        GSM_ONLY => RadioAccessMode::Gsm,
        _ => {
            debug!(rat, "unexpected preferred network type");
            RadioAccessMode::Gsm
        }
    }
}
