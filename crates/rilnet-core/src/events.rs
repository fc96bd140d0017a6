//! Engine change notifications.
//!
//! Events are emitted through a [`tokio::sync::broadcast`] channel when
//! the engine's view of the network changes. They carry no payload;
//! subscribers re-read the current state through the engine's snapshot
//! accessor. Delivery is best-effort — a slow consumer may miss events
//! under load and should treat any received event as "something
//! changed, go look".

/// A zero-payload change notification from the network engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The current operator changed (including appearing or vanishing).
    OperatorChanged,
    /// The voice registration state changed.
    VoiceStateChanged,
    /// The data registration state changed.
    DataStateChanged,
    /// The peer-confirmed preferred mode changed.
    PrefModeChanged,
    /// The cross-modem maximum preferred mode changed.
    MaxPrefModeChanged,
}
