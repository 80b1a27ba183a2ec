//! In-memory record store, for embedding and tests

use super::{RecordStore, StoreError, VerifiedRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, VerifiedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one record
    pub fn with_record(record: VerifiedRecord) -> Self {
        let mut records = HashMap::new();
        records.insert(record.filename.clone(), record);
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, name: &str) -> Result<Option<VerifiedRecord>, StoreError> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn store(&self, record: VerifiedRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.remove(&record.filename);
        records.insert(record.filename.clone(), record);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
