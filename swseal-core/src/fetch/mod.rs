//! Update fetching - retrieve, verify and persist a fresh payload
//!
//! Sources only retrieve text. They must tell a definite "not there" apart
//! from "could not find out": the first is terminal for the loader, the
//! second is retried.

pub mod directory;
#[cfg(feature = "http")]
pub mod http;

pub use directory::DirectorySource;
#[cfg(feature = "http")]
pub use http::HttpSource;

use crate::store::{RecordStore, VerifiedRecord};
use crate::trust::{SignatureVerifier, VerifiedPayload};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Source errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// The resource is definitively absent
    #[error("script '{name}' not found (status {status})")]
    NotFound { name: String, status: u16 },

    /// No definite answer: offline, DNS, timeout
    #[error("network error fetching '{name}': {message}")]
    Network { name: String, message: String },
}

/// Where payloads come from
#[async_trait]
pub trait ScriptSource: Send + Sync {
    /// Retrieve the raw payload text for `name`
    async fn fetch(&self, name: &str) -> Result<String, SourceError>;

    /// Source identifier for logging
    fn name(&self) -> &'static str;
}

/// Result of one fetch-and-install attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Verified and persisted
    Installed(VerifiedPayload),
    /// Retrieved but failed verification
    Rejected,
    NotFound,
    NetworkError,
}

/// Fetches payloads, verifies them and replaces the stored record
#[derive(Clone)]
pub struct UpdateFetcher {
    source: Arc<dyn ScriptSource>,
    verifier: Arc<SignatureVerifier>,
    store: Arc<dyn RecordStore>,
}

impl UpdateFetcher {
    pub fn new(
        source: Arc<dyn ScriptSource>,
        verifier: Arc<SignatureVerifier>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            source,
            verifier,
            store,
        }
    }

    /// Fetch the canonical resource and install it if it verifies.
    ///
    /// With `min_mod_time`, payloads not strictly newer are rejected.
    pub async fn fetch_and_install(&self, min_mod_time: Option<i64>) -> FetchOutcome {
        let name = self.verifier.script_name();
        debug!("Fetching '{}' from {} source", name, self.source.name());

        let payload = match self.source.fetch(name).await {
            Ok(payload) => payload,
            Err(e @ SourceError::NotFound { .. }) => {
                warn!("{}", e);
                return FetchOutcome::NotFound;
            }
            Err(e @ SourceError::Network { .. }) => {
                warn!("{}", e);
                return FetchOutcome::NetworkError;
            }
        };

        let Some(verified) = self.verifier.verify(&payload, min_mod_time) else {
            return FetchOutcome::Rejected;
        };

        let record = VerifiedRecord::new(name, payload, verified.modified_time);
        match self.store.store(record).await {
            Ok(()) => info!(
                "Installed '{}' modified {} into {} store",
                name,
                verified.modified_time,
                self.store.name()
            ),
            // The payload still runs; only the durable copy is missing
            Err(e) => warn!("Verified payload could not be persisted: {}", e),
        }

        FetchOutcome::Installed(verified)
    }
}
