//! rilnet-test-harness: Test utilities and a mock transport for rilnet.
//!
//! This crate provides [`MockIo`] for deterministic unit testing of the
//! network engine without a real modem.

pub mod mock_io;

pub use mock_io::{MockIo, SubmittedRequest};
