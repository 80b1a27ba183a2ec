//! Persistence of the last verified payload
//!
//! One record per script identifier. A record is only written after a payload
//! verified, and is replaced wholesale (delete, then insert) on every newer
//! install. Stores never retry: any failure is a cache miss and the caller
//! falls through to the network.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Durable last-known-good state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedRecord {
    /// Script identifier, the record key
    pub filename: String,

    /// The full signed payload; re-verified every time it is loaded
    pub contents: String,

    /// Signer's modification time, carried over from the payload metadata.
    /// Records written out-of-band must set it by hand.
    pub updated_time: i64,

    /// When this pipeline fetched the payload; drives the weekly refresh
    pub downloaded_time: DateTime<Utc>,
}

impl VerifiedRecord {
    pub fn new(
        filename: impl Into<String>,
        contents: impl Into<String>,
        updated_time: i64,
    ) -> Self {
        Self {
            filename: filename.into(),
            contents: contents.into(),
            updated_time,
            downloaded_time: Utc::now(),
        }
    }

    /// Stale records and records downloaded "in the future" both need a
    /// refresh. A `max_age` reaching past the calendar range never expires.
    pub fn needs_refresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let expired = self
            .downloaded_time
            .checked_add_signed(max_age)
            .is_some_and(|due| due < now);
        expired || self.downloaded_time > now
    }
}

/// Storage errors. All of them are treated as a cache miss by the loader.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access record store at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record store at {path} is corrupted")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record store version {found} does not match expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

/// Durable keyed storage for verified records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the record for `name`. A store that does not exist yet is the
    /// same as a missing record.
    async fn load(&self, name: &str) -> Result<Option<VerifiedRecord>, StoreError>;

    /// Replace any record with the same filename
    async fn store(&self, record: VerifiedRecord) -> Result<(), StoreError>;

    /// Backend identifier for logging
    fn name(&self) -> &'static str;
}
