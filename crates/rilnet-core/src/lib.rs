//! rilnet-core: Core types, errors, events, and the transport contract
//! for rilnet.
//!
//! This crate defines the peer-agnostic abstractions the network engine
//! is built on. Modem glue and applications depend on these types
//! without pulling in the engine itself.
//!
//! # Key types
//!
//! - [`RilIo`] -- the binary request/response channel to the peer
//! - [`NetworkEvent`] -- asynchronous change notifications
//! - [`RegistrationState`] / [`OperatorInfo`] -- the peer-reported view
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use rilnet_core::*`.
pub use error::{Error, Result};
pub use events::NetworkEvent;
pub use transport::{
    Completion, CompletionSink, RequestId, RequestOpts, RetryPolicy, RilIo, RilOpcode, RilRequest,
    UnsolEvent, STATUS_FAILURE, STATUS_SUCCESS,
};
pub use types::*;
