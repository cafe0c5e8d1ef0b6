use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{check_write, Document, DocumentStore};
use crate::error::{ComicdeskError, Result};

/// In-process document store for dry runs and tests
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    failing: Mutex<HashSet<String>>,
    writes: Mutex<usize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make reads of `collection` fail
    pub fn fail_reads_of(&self, collection: &str) {
        self.failing.lock().unwrap().insert(collection.to_string());
    }

    /// Number of successful `set` calls so far
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    fn check_readable(&self, collection: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(collection) {
            return Err(ComicdeskError::Documents(format!("Read failed for {}", collection)));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        self.check_readable(collection)?;
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.check_readable(collection)?;
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        check_write(collection, id, &data)?;
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}
