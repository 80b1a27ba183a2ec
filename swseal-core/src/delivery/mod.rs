//! Delivery state machine building blocks
//!
//! The transitions themselves are driven by [`crate::loader::Loader`];
//! this module holds the state, the context it lives in and the runtime
//! seam for the delivered script.

pub mod context;
pub mod runtime;
pub mod state;

pub use context::PipelineContext;
pub use runtime::{
    Callback, FetchHandler, HandlerRegistry, HostEvent, Listener, ScriptFault, ScriptRuntime,
};
pub use state::DeliveryState;
