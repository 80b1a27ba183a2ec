//! File-backed record store
//!
//! All records live in one versioned JSON document. Writes go through a
//! temporary file in the same directory and are renamed into place, so a
//! crash mid-write leaves the previous document intact.

use super::{RecordStore, StoreError, VerifiedRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Document format version. Documents with any other version are ignored.
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    records: BTreeMap<String, VerifiedRecord>,
}

impl StoreDocument {
    fn empty() -> Self {
        Self {
            version: STORE_VERSION,
            records: BTreeMap::new(),
        }
    }
}

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the document has not been created yet
    async fn read_document(&self) -> Result<Option<StoreDocument>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let document: StoreDocument =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        if document.version != STORE_VERSION {
            return Err(StoreError::VersionMismatch {
                found: document.version,
                expected: STORE_VERSION,
            });
        }

        Ok(Some(document))
    }

    /// Atomic replace of the whole document. The filesystem work runs on
    /// the blocking pool.
    async fn write_document(&self, document: StoreDocument) -> Result<(), StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &document))
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })?
    }
}

fn write_atomically(path: &Path, document: &StoreDocument) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let json = serde_json::to_string_pretty(document).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    temp.write_all(json.as_bytes()).map_err(io_err)?;
    temp.flush().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}

#[async_trait]
impl RecordStore for FileStore {
    async fn load(&self, name: &str) -> Result<Option<VerifiedRecord>, StoreError> {
        let Some(document) = self.read_document().await? else {
            debug!("Record store {} not created yet", self.path.display());
            return Ok(None);
        };
        Ok(document.records.get(name).cloned())
    }

    async fn store(&self, record: VerifiedRecord) -> Result<(), StoreError> {
        // An unreadable document is replaced rather than repaired
        let mut document = match self.read_document().await {
            Ok(Some(document)) => document,
            Ok(None) => StoreDocument::empty(),
            Err(e) => {
                warn!("Discarding unreadable record store: {}", e);
                StoreDocument::empty()
            }
        };

        document.records.remove(&record.filename);
        debug!(
            "Storing record '{}' (updated {}) in {}",
            record.filename,
            record.updated_time,
            self.path.display()
        );
        document.records.insert(record.filename.clone(), record);

        self.write_document(document).await
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
