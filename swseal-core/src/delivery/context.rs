//! Pipeline context: delivery state and the queue of waiting requests

use super::state::DeliveryState;
use super::FetchHandler;
use crate::intercept::pending::{PendingRequest, RequestHandle, Resolution};
use crate::trust::VerifiedPayload;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Everything the state machine mutates, owned in one place.
///
/// The loader keeps it behind a single lock, so every transition and the
/// dispatch it triggers happen without another request interleaving.
#[derive(Debug, Default)]
pub struct PipelineContext {
    state: DeliveryState,
    pending: Vec<PendingRequest>,
    current: Option<VerifiedPayload>,
    load_in_flight: bool,
    next_request_id: u64,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    /// Move to `to`; returns the previous state
    pub fn transition(&mut self, to: DeliveryState) -> DeliveryState {
        let from = self.state;
        if from != to {
            info!(from = %from, to = %to, "Delivery state changed");
        }
        self.state = to;
        from
    }

    /// Park a request; the receiver yields its resolution
    pub fn enqueue(&mut self, uri: impl Into<String>) -> oneshot::Receiver<Resolution> {
        self.next_request_id += 1;
        let handle = RequestHandle {
            id: self.next_request_id,
            uri: uri.into(),
        };
        debug!(id = handle.id, uri = %handle.uri, state = %self.state, "Request queued");

        let (pending, receiver) = PendingRequest::new(handle);
        self.pending.push(pending);
        receiver
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Resolve every queued request, oldest first, against the current
    /// state. Nothing happens while still loading. Returns how many
    /// resolutions were delivered.
    pub fn dispatch(&mut self, handler: Option<Arc<dyn FetchHandler>>) -> usize {
        if !self.state.is_resolvable() {
            return 0;
        }

        let resolution = Resolution::for_state(self.state, handler);
        let mut delivered = 0;
        for mut pending in self.pending.drain(..) {
            if pending.resolve(resolution.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn current(&self) -> Option<&VerifiedPayload> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, payload: VerifiedPayload) {
        self.current = Some(payload);
    }

    pub fn load_in_flight(&self) -> bool {
        self.load_in_flight
    }

    /// Claim the startup load; `false` when one is already running
    pub fn begin_load(&mut self) -> bool {
        if self.load_in_flight {
            return false;
        }
        self.load_in_flight = true;
        true
    }

    pub fn finish_load(&mut self) {
        self.load_in_flight = false;
    }

    /// Back to a fresh `Loading` context.
    ///
    /// Pending requests are dropped, not resolved; their waiters observe
    /// the closed channel. Returns how many were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            warn!(dropped, "Reset discarded pending requests");
        }
        self.transition(DeliveryState::Loading);
        self.pending.clear();
        self.current = None;
        self.load_in_flight = false;
        dropped
    }
}
