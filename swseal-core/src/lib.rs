//! swseal core library
//!
//! Verifies a signed, self-updating control script before it ever runs and
//! keeps every intercepted request behind that verification.
//!
//! - [`payload`] - metadata framing of signed payloads
//! - [`trust`] - keys, signing and signature verification
//! - [`store`] - last-known-good persistence
//! - [`fetch`] - retrieving and installing fresh payloads
//! - [`delivery`] - delivery state and the script runtime seam
//! - [`intercept`] - request resolution, error pages, response rewriting
//! - [`watchdog`] - the tamper-detection snippet injected into pages
//! - [`loader`] - the facade the host wires its hooks to

pub mod config;
pub mod delivery;
pub mod error;
pub mod fetch;
pub mod intercept;
pub mod loader;
pub mod payload;
pub mod store;
pub mod trust;
pub mod watchdog;

pub use config::{LoaderConfig, DEBUG_ORIGIN};
pub use error::LoaderError;
pub use loader::{Loader, LoaderBuilder};
