//! Mock RIL transport for deterministic testing of the network engine.
//!
//! [`MockIo`] implements [`RilIo`] by recording every submission and
//! letting the test script completions and unsolicited events by hand.
//! Nothing completes until the test says so, which makes pending-request
//! and cancellation behavior directly observable.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rilnet_core::{RilIo, RilOpcode, RilRequest, RequestOpts, STATUS_SUCCESS};
//! use rilnet_test_harness::MockIo;
//!
//! let io = Arc::new(MockIo::new());
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let id = io.submit(RilRequest::query(RilOpcode::Operator), RequestOpts::default(), tx);
//! io.complete(id, STATUS_SUCCESS, vec![]);
//! assert_eq!(rx.try_recv().unwrap().id, id);
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use rilnet_core::transport::{
    Completion, CompletionSink, RequestId, RequestOpts, RilIo, RilOpcode, RilRequest, UnsolEvent,
};

/// One recorded `submit` call.
#[derive(Debug, Clone)]
pub struct SubmittedRequest {
    /// Handle returned to the submitter.
    pub id: RequestId,
    /// The opcode submitted.
    pub opcode: RilOpcode,
    /// The encoded payload submitted.
    pub payload: Vec<u8>,
    /// The options the request was submitted with.
    pub opts: RequestOpts,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    submitted: Vec<SubmittedRequest>,
    /// Completion sinks of requests not yet completed or canceled.
    active: HashMap<RequestId, CompletionSink>,
    canceled: Vec<RequestId>,
    retried: Vec<RequestId>,
}

/// A scripted [`RilIo`] for tests.
///
/// Submissions are recorded and stay pending until the test completes
/// or cancels them. Unsolicited events are injected with
/// [`emit_unsolicited`](MockIo::emit_unsolicited).
pub struct MockIo {
    inner: Mutex<Inner>,
    unsol_tx: broadcast::Sender<UnsolEvent>,
}

impl MockIo {
    /// Create a new mock transport with no recorded traffic.
    pub fn new() -> Self {
        let (unsol_tx, _) = broadcast::channel(16);
        MockIo {
            inner: Mutex::new(Inner::default()),
            unsol_tx,
        }
    }

    /// All submissions so far, in order.
    pub fn submitted(&self) -> Vec<SubmittedRequest> {
        self.inner.lock().unwrap().submitted.clone()
    }

    /// Submissions of one opcode, in order.
    pub fn submitted_with(&self, opcode: RilOpcode) -> Vec<SubmittedRequest> {
        self.inner
            .lock()
            .unwrap()
            .submitted
            .iter()
            .filter(|r| r.opcode == opcode)
            .cloned()
            .collect()
    }

    /// Number of submissions of one opcode.
    pub fn submit_count(&self, opcode: RilOpcode) -> usize {
        self.submitted_with(opcode).len()
    }

    /// Total number of submissions.
    pub fn total_submitted(&self) -> usize {
        self.inner.lock().unwrap().submitted.len()
    }

    /// Number of requests still pending (neither completed nor canceled).
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().active.len()
    }

    /// Deliver a completion for a pending request.
    ///
    /// Does nothing if the request was already completed or canceled —
    /// the same guarantee a real transport gives.
    pub fn complete(&self, id: RequestId, status: i32, payload: Vec<u8>) {
        let sink = self.inner.lock().unwrap().active.remove(&id);
        if let Some(sink) = sink {
            let _ = sink.send(Completion {
                id,
                status,
                payload,
            });
        }
    }

    /// Complete the oldest pending request with the given opcode.
    ///
    /// Returns the completed handle, or `None` if no such request is
    /// pending.
    pub fn complete_next(
        &self,
        opcode: RilOpcode,
        status: i32,
        payload: Vec<u8>,
    ) -> Option<RequestId> {
        let id = {
            let inner = self.inner.lock().unwrap();
            inner
                .submitted
                .iter()
                .find(|r| r.opcode == opcode && inner.active.contains_key(&r.id))
                .map(|r| r.id)
        }?;
        self.complete(id, status, payload);
        Some(id)
    }

    /// Handles canceled so far, in order.
    pub fn canceled(&self) -> Vec<RequestId> {
        self.inner.lock().unwrap().canceled.clone()
    }

    /// Whether a specific handle was canceled.
    pub fn was_canceled(&self, id: RequestId) -> bool {
        self.inner.lock().unwrap().canceled.contains(&id)
    }

    /// How many times `retry_now` was called for a handle.
    pub fn retry_count(&self, id: RequestId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .retried
            .iter()
            .filter(|r| **r == id)
            .count()
    }

    /// Inject an unsolicited peer event.
    pub fn emit_unsolicited(&self, event: UnsolEvent) {
        // Ignore "no subscribers" — same as a peer talking to no one.
        let _ = self.unsol_tx.send(event);
    }
}

impl Default for MockIo {
    fn default() -> Self {
        Self::new()
    }
}

impl RilIo for MockIo {
    fn submit(&self, request: RilRequest, opts: RequestOpts, done: CompletionSink) -> RequestId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = RequestId::from_raw(inner.next_id);
        inner.submitted.push(SubmittedRequest {
            id,
            opcode: request.opcode,
            payload: request.payload,
            opts,
        });
        inner.active.insert(id, done);
        id
    }

    fn retry_now(&self, id: RequestId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.active.contains_key(&id) {
            inner.retried.push(id);
        }
    }

    fn cancel(&self, id: RequestId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.active.remove(&id).is_some() {
            inner.canceled.push(id);
        }
    }

    fn subscribe_unsolicited(&self) -> broadcast::Receiver<UnsolEvent> {
        self.unsol_tx.subscribe()
    }
}
