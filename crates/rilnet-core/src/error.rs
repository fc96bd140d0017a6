//! Error types for rilnet.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Wire-decode errors, peer failures,
//! and engine-lifecycle errors are all captured here.

/// The error type for all rilnet operations.
///
/// Variants cover the failure modes encountered when talking to a RIL
/// peer: malformed binary parcels, non-success completions, and a
/// shut-down engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A malformed binary parcel (truncated buffer, bad length prefix,
    /// invalid UTF-8, or a missing mandatory field).
    #[error("malformed parcel: {0}")]
    Malformed(String),

    /// The peer completed a request with a non-success status code.
    #[error("request failed with status {0}")]
    RequestFailed(i32),

    /// The engine task has shut down, or the transport is gone.
    #[error("not connected")]
    NotConnected,

    /// Timed out waiting for a completion.
    #[error("timeout waiting for completion")]
    Timeout,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
