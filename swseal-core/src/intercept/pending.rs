//! Requests waiting for the delivery state to settle

use crate::delivery::{DeliveryState, FetchHandler};
use crate::intercept::pages::PageKind;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

/// What a settled state means for one request
#[derive(Clone)]
pub enum Resolution {
    /// Serve a fixed page
    Page(PageKind),
    /// Hand the request to the captured fetch handler, if any
    Delegate(Option<Arc<dyn FetchHandler>>),
}

impl Resolution {
    pub fn for_state(state: DeliveryState, handler: Option<Arc<dyn FetchHandler>>) -> Self {
        match state {
            DeliveryState::RunFail => Resolution::Page(PageKind::ScriptError),
            DeliveryState::SoftFail => Resolution::Page(PageKind::SoftFail),
            DeliveryState::Ready => Resolution::Delegate(handler),
            DeliveryState::HardFail | DeliveryState::Loading => {
                Resolution::Page(PageKind::HardFail)
            }
        }
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Page(kind) => f.debug_tuple("Page").field(kind).finish(),
            Resolution::Delegate(handler) => f
                .debug_tuple("Delegate")
                .field(&handler.is_some())
                .finish(),
        }
    }
}

/// Identifies a request in logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHandle {
    pub id: u64,
    pub uri: String,
}

/// A request parked until the state leaves `Loading`.
///
/// Resolves at most once; later attempts are no-ops.
#[derive(Debug)]
pub struct PendingRequest {
    handle: RequestHandle,
    resolver: Option<oneshot::Sender<Resolution>>,
    done: bool,
}

impl PendingRequest {
    pub fn new(handle: RequestHandle) -> (Self, oneshot::Receiver<Resolution>) {
        let (resolver, receiver) = oneshot::channel();
        (
            Self {
                handle,
                resolver: Some(resolver),
                done: false,
            },
            receiver,
        )
    }

    pub fn handle(&self) -> &RequestHandle {
        &self.handle
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Deliver `resolution`; `false` when already resolved or when the
    /// waiting side gave up
    pub fn resolve(&mut self, resolution: Resolution) -> bool {
        if self.done {
            return false;
        }
        self.done = true;

        match self.resolver.take() {
            Some(resolver) => {
                let delivered = resolver.send(resolution).is_ok();
                if !delivered {
                    trace!("Request {} no longer waiting", self.handle.id);
                }
                delivered
            }
            None => false,
        }
    }
}
