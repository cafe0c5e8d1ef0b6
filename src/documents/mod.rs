//! Document database abstraction.
//!
//! Collections are addressed by slash-separated paths (`comics`,
//! `comics/foo/episodes`). Writes are single-document full overwrites; there is
//! no partial patch and no transaction.

pub mod firestore;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ComicdeskError, Result};

pub use firestore::FirestoreClient;
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// A stored document: its id inside the collection plus the stored fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document of a collection. Order is backend-defined.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// A single document, `None` when it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or fully replace a document.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// Flush anything the backend buffers locally. Remote backends hold
    /// nothing between calls.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Documents must be JSON objects and ids must be single path segments
pub(crate) fn check_write(collection: &str, id: &str, data: &Value) -> Result<()> {
    if collection.is_empty() || collection.split('/').any(str::is_empty) {
        return Err(ComicdeskError::Validation(format!("Invalid collection path: '{}'", collection)));
    }
    if id.is_empty() || id.contains('/') {
        return Err(ComicdeskError::Validation(format!("Invalid document id: '{}'", id)));
    }
    if !data.is_object() {
        return Err(ComicdeskError::Validation(format!(
            "Document {}/{} must be a JSON object",
            collection, id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_write() {
        assert!(check_write("comics", "foo", &json!({"a": 1})).is_ok());
        assert!(check_write("comics/foo/episodes", "episode01", &json!({})).is_ok());
        assert!(check_write("", "foo", &json!({})).is_err());
        assert!(check_write("comics", "a/b", &json!({})).is_err());
        assert!(check_write("comics", "foo", &json!([1, 2])).is_err());
    }
}
