//! Vendor adaptation hooks.
//!
//! Some peers want vendor-specific request layouts. The engine asks the
//! adapter first and falls back to the generic encoding when the
//! adapter declines.

use rilnet_core::GprsContext;

/// Vendor-specific request encodings.
pub trait VendorAdapter: Send + Sync {
    /// Build a set-initial-attach-APN payload for this vendor, or
    /// `None` to use the default encoding.
    fn build_attach_apn_request(&self, _ctx: &GprsContext) -> Option<Vec<u8>> {
        None
    }
}
