//! Seam between the loader and whatever executes the delivered script
//!
//! A [`ScriptRuntime`] runs a verified body once and lets it register
//! listeners. The body only ever sees a [`HandlerRegistry`], never the host,
//! so a fetch handler it registers is captured by the loader instead of
//! being installed where it could answer requests unchecked.

use crate::intercept::response::{HandlerOutput, Request};
use async_trait::async_trait;
use futures::future::{ready, Ready};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, trace};

/// Faults raised by the delivered script
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptFault {
    #[error("script failed to run: {0}")]
    Runtime(String),

    #[error("fetch handler failed: {0}")]
    Handler(String),

    #[error("event name must not be empty")]
    EmptyEvent,

    #[error("listener for '{event}' has the wrong shape")]
    InvalidListener { event: String },

    #[error("script did not register a fetch handler")]
    NoHandler,

    #[error("script panicked")]
    Panicked,
}

/// Request handler registered by the delivered script
#[async_trait]
pub trait FetchHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Result<HandlerOutput, ScriptFault>;
}

/// Executes a verified script body
pub trait ScriptRuntime: Send + Sync {
    /// Run `body`, which registers its listeners on `registry`
    fn run(&self, body: &str, registry: &HandlerRegistry) -> Result<(), ScriptFault>;

    /// Runtime identifier for logging
    fn name(&self) -> &'static str;
}

/// Event handed to non-fetch listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    pub name: String,
}

impl HostEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Lifecycle work is never waited on; the handle is already settled
    pub fn wait_until(&self) -> Ready<()> {
        ready(())
    }
}

pub type Callback = Arc<dyn Fn(&HostEvent) + Send + Sync>;

/// A listener as registered by the script
#[derive(Clone)]
pub enum Listener {
    Fetch(Arc<dyn FetchHandler>),
    Callback(Callback),
}

impl Listener {
    pub fn fetch(handler: impl FetchHandler + 'static) -> Self {
        Listener::Fetch(Arc::new(handler))
    }

    pub fn callback(callback: impl Fn(&HostEvent) + Send + Sync + 'static) -> Self {
        Listener::Callback(Arc::new(callback))
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Fetch(_) => f.write_str("Listener::Fetch"),
            Listener::Callback(_) => f.write_str("Listener::Callback"),
        }
    }
}

#[derive(Default)]
struct RegistryTable {
    fetch: Option<Arc<dyn FetchHandler>>,
    passthrough: HashMap<String, Vec<Callback>>,
}

/// Registration facade handed to the delivered script.
///
/// Clones share one table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    table: Arc<Mutex<RegistryTable>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, RegistryTable> {
        // a panicking script must not wedge the registry
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a listener, the way a script calls `addEventListener`.
    ///
    /// `fetch` is captured (last registration wins), `install` and
    /// `activate` run immediately, everything else goes to the passthrough
    /// table.
    pub fn add_event_listener(&self, event: &str, listener: Listener) -> Result<(), ScriptFault> {
        if event.is_empty() {
            return Err(ScriptFault::EmptyEvent);
        }

        let lowered = event.to_ascii_lowercase();
        match (lowered.as_str(), listener) {
            ("fetch", Listener::Fetch(handler)) => {
                debug!("Captured fetch handler");
                self.table().fetch = Some(handler);
                Ok(())
            }
            ("install" | "activate", Listener::Callback(callback)) => {
                trace!("Running {} listener immediately", lowered);
                callback(&HostEvent::new(lowered));
                Ok(())
            }
            ("fetch" | "install" | "activate", _) => Err(ScriptFault::InvalidListener {
                event: event.to_string(),
            }),
            (_, Listener::Callback(callback)) => {
                trace!("Forwarding '{}' listener to host", event);
                self.table()
                    .passthrough
                    .entry(event.to_string())
                    .or_default()
                    .push(callback);
                Ok(())
            }
            (_, Listener::Fetch(_)) => Err(ScriptFault::InvalidListener {
                event: event.to_string(),
            }),
        }
    }

    /// Equivalent of assigning `onfetch`
    pub fn set_fetch_handler(&self, handler: Option<Arc<dyn FetchHandler>>) {
        self.table().fetch = handler;
    }

    pub fn fetch_handler(&self) -> Option<Arc<dyn FetchHandler>> {
        self.table().fetch.clone()
    }

    /// Drop the captured fetch handler
    pub fn clear(&self) {
        self.table().fetch = None;
    }

    /// Events the host has to deliver itself
    pub fn passthrough_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.table().passthrough.keys().cloned().collect();
        events.sort();
        events
    }

    /// Deliver a host event to passthrough listeners; returns how many ran
    pub fn dispatch(&self, event: &HostEvent) -> usize {
        let callbacks = self
            .table()
            .passthrough
            .get(&event.name)
            .cloned()
            .unwrap_or_default();
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        f.debug_struct("HandlerRegistry")
            .field("fetch", &table.fetch.is_some())
            .field("passthrough", &table.passthrough.len())
            .finish()
    }
}
