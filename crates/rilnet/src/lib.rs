//! # rilnet -- Radio-Network Registration and RAT Negotiation
//!
//! `rilnet` is an asynchronous Rust library implementing the
//! registration-tracking and preferred-radio-access-technology
//! negotiation engine that sits on top of a modem's binary
//! request/response transport ("RIL").
//!
//! It decodes registration, operator, and preferred-mode parcels,
//! derives the target RAT from SIM capability, user preference, and a
//! cross-modem ceiling, and keeps the peer's preferred mode, data
//! profile list, and initial-attach APN in sync — with holdoff and
//! retry semantics tuned for real, occasionally unreliable peers.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rilnet::{AccessModes, GprsWatch, NetworkBuilder, Radio, RilIo, SimCard, SimSettings};
//!
//! # async fn example(io: Arc<dyn RilIo>) {
//! let radio = Radio::new();
//! let network = NetworkBuilder::new()
//!     .log_prefix("ril0")
//!     .build(
//!         io,
//!         radio.clone(),
//!         SimCard::new(),
//!         SimSettings::new(AccessModes::all()),
//!         GprsWatch::new(),
//!     );
//!
//! let mut events = network.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}: {:?}", network.snapshot());
//! }
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                  | Purpose                                     |
//! |------------------------|---------------------------------------------|
//! | `rilnet-core`          | Types, errors, events, the [`RilIo`] contract |
//! | `rilnet-engine`        | Parcel codec, decoders, the network engine  |
//! | `rilnet-test-harness`  | Scripted mock transport for tests           |
//! | **`rilnet`**           | This facade crate -- re-exports everything  |
//!
//! The engine consumes any [`RilIo`] implementation, so application
//! code stays transport-agnostic and tests run against the mock.

pub use rilnet_core::{
    profile_id, AccessModes, Completion, CompletionSink, DataProfile, Error, GprsAuthMethod,
    GprsContext, GprsContextType, GprsProto, NetworkEvent, OperatorInfo, OperatorStatus,
    RadioAccessMode, RadioState, RegistrationState, RegistrationStatus, RequestId, RequestOpts,
    Result, RetryPolicy, RilIo, RilOpcode, RilRequest, UnsolEvent, MAX_OPERATOR_NAME_LEN,
    STATUS_FAILURE, STATUS_SUCCESS,
};

pub use rilnet_engine::{
    GprsSnapshot, GprsWatch, NetworkBuilder, NetworkConfig, NetworkSnapshot, Radio, RadioStatus,
    RilNetwork, SimCard, SimSettings, SimSettingsSnapshot, SimStatus, VendorAdapter,
};
