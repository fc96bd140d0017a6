//! The transport contract between the network engine and the RIL peer.
//!
//! The [`RilIo`] trait abstracts the binary request/response channel to
//! the modem. Implementations own framing, request serials, response
//! timeouts, and retry backoff; this crate only defines the submission
//! contract the engine consumes. A scripted implementation for tests
//! lives in the `rilnet-test-harness` crate.
//!
//! Submission is fire-and-forget: `submit` queues the request and
//! returns a handle immediately; the completion is delivered later on
//! the [`CompletionSink`] supplied by the caller. This keeps the engine
//! single-threaded — every completion re-enters it as an event.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

/// Requests the engine submits to the peer.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RilOpcode {
    /// Query the voice registration state.
    VoiceRegistrationState = 20,
    /// Query the data registration state.
    DataRegistrationState = 21,
    /// Query the current operator.
    Operator = 22,
    /// Set the preferred network type (raw RAT code).
    SetPreferredNetworkType = 73,
    /// Query the effective preferred network type.
    GetPreferredNetworkType = 74,
    /// Register the initial attach APN for LTE.
    SetInitialAttachApn = 111,
    /// Replace the peer's stored data profile list.
    SetDataProfile = 128,
}

/// Unsolicited events delivered by the peer.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnsolEvent {
    /// Registration or operator state changed; re-poll everything.
    NetworkStateChanged = 1002,
    /// The modem's radio capability changed; the peer may have silently
    /// reverted the preferred mode.
    RadioCapabilityChanged = 1042,
}

/// Completion status code for a successful request.
pub const STATUS_SUCCESS: i32 = 0;

/// Generic failure status, for transports that have nothing better.
pub const STATUS_FAILURE: i32 = 2;

/// A request ready for submission.
#[derive(Debug, Clone)]
pub struct RilRequest {
    /// Which request this is.
    pub opcode: RilOpcode,
    /// Encoded parcel payload (may be empty for plain queries).
    pub payload: Vec<u8>,
}

impl RilRequest {
    /// Create a request from an opcode and an encoded payload.
    pub fn new(opcode: RilOpcode, payload: Vec<u8>) -> Self {
        RilRequest { opcode, payload }
    }

    /// Create a payload-less query request.
    pub fn query(opcode: RilOpcode) -> Self {
        RilRequest {
            opcode,
            payload: Vec::new(),
        }
    }
}

/// Transport-level retry policy for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts.
    pub interval: Duration,
    /// Attempt cap; `None` retries until canceled.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever at a fixed interval.
    pub fn unlimited(interval: Duration) -> Self {
        RetryPolicy {
            interval,
            max_attempts: None,
        }
    }
}

/// Per-request submission options.
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    /// Response timeout override; `None` uses the transport default.
    pub timeout: Option<Duration>,
    /// Retry policy; `None` means a failed request completes as failed.
    pub retry: Option<RetryPolicy>,
}

/// Handle identifying one submitted request.
///
/// Only meaningful to the transport that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Construct a handle from a raw serial. Transport implementations
    /// use this; the engine treats handles as opaque.
    pub fn from_raw(raw: u64) -> Self {
        RequestId(raw)
    }

    /// The raw serial.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The completion of one submitted request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Handle returned by the matching `submit` call.
    pub id: RequestId,
    /// Peer status code; only [`STATUS_SUCCESS`] is data-bearing.
    pub status: i32,
    /// Response parcel payload (empty unless the request has one).
    pub payload: Vec<u8>,
}

impl Completion {
    /// Whether the request succeeded.
    pub fn ok(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Where completions are delivered.
///
/// The engine hands the transport a clone of its own event-loop sender,
/// so completions re-enter the engine as ordinary events.
pub type CompletionSink = mpsc::UnboundedSender<Completion>;

/// Asynchronous binary request channel to the RIL peer.
///
/// All methods are non-blocking. `submit` must not invoke the sink
/// inline — completions are delivered from the transport's own driving
/// context, never re-entrantly from the submit call.
pub trait RilIo: Send + Sync {
    /// Queue a request for transmission.
    ///
    /// The completion — success or failure, after any transport-level
    /// retries — is sent to `done` exactly once, unless the request is
    /// canceled first.
    fn submit(&self, request: RilRequest, opts: RequestOpts, done: CompletionSink) -> RequestId;

    /// Ask the transport to retry a pending request right away instead
    /// of waiting for its retry interval to elapse. No-op for unknown
    /// or completed handles.
    fn retry_now(&self, id: RequestId);

    /// Cancel a pending request. Its completion is never delivered.
    /// No-op for unknown or completed handles.
    fn cancel(&self, id: RequestId);

    /// Subscribe to unsolicited peer events.
    fn subscribe_unsolicited(&self) -> broadcast::Receiver<UnsolEvent>;
}
