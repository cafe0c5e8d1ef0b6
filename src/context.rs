//! Explicitly constructed backend context handed to every component.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{credential, Config, DocumentsBackend, StorageBackend};
use crate::documents::{DocumentStore, FirestoreClient, MemoryDocumentStore, SqliteDocumentStore};
use crate::error::{ComicdeskError, Result};
use crate::paths::UnitKind;
use crate::storage::{FirebaseStorage, LocalObjectStore, MemoryObjectStore, ObjectStore};
use crate::upload::FailurePolicy;

/// Where titles and units live in the document database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLayout {
    pub unit_kind: UnitKind,
    pub root_collection: String,
}

impl CatalogLayout {
    pub fn new(unit_kind: UnitKind, root_collection: &str) -> Self {
        Self {
            unit_kind,
            root_collection: root_collection.to_string(),
        }
    }

    /// `<root>/<title>/<episodes|chapters>`
    pub fn units_collection(&self, title_id: &str) -> String {
        format!("{}/{}/{}", self.root_collection, title_id, self.unit_kind.collection())
    }
}

impl Default for CatalogLayout {
    fn default() -> Self {
        Self::new(UnitKind::default(), "comics")
    }
}

/// Backend clients plus the catalog settings every operation needs
#[derive(Clone)]
pub struct AppContext {
    pub storage: Arc<dyn ObjectStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub layout: CatalogLayout,
    pub failure_policy: FailurePolicy,
    media_root: Option<PathBuf>,
}

impl AppContext {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentStore>,
        layout: CatalogLayout,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            storage,
            documents,
            layout,
            failure_policy,
            media_root: None,
        }
    }

    /// Context over fresh in-memory backends
    pub fn in_memory(layout: CatalogLayout, failure_policy: FailurePolicy) -> Self {
        Self::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryDocumentStore::new()),
            layout,
            failure_policy,
        )
    }

    /// Build the configured backends
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mut media_root = None;

        let storage: Arc<dyn ObjectStore> = match config.storage.backend {
            StorageBackend::Firebase => {
                let bucket = config
                    .storage
                    .bucket
                    .clone()
                    .ok_or_else(|| ComicdeskError::Config("storage.bucket is not set".to_string()))?;
                let token = credential(config.storage.access_token_env.as_deref());
                log::info!("Object store: Firebase Storage bucket {}", bucket);
                Arc::new(FirebaseStorage::new(bucket, token)?)
            }
            StorageBackend::Local => {
                let root = config.local_root().to_path_buf();
                tokio::fs::create_dir_all(&root).await?;
                log::info!("Object store: local directory {}", root.display());
                media_root = Some(root.clone());
                Arc::new(LocalObjectStore::new(root, &config.storage.public_base_url)?)
            }
            StorageBackend::Memory => {
                log::warn!("Object store: in-memory, uploads are lost on exit");
                Arc::new(MemoryObjectStore::new())
            }
        };

        let documents: Arc<dyn DocumentStore> = match config.documents.backend {
            DocumentsBackend::Firestore => {
                let project_id = config
                    .documents
                    .project_id
                    .clone()
                    .ok_or_else(|| ComicdeskError::Config("documents.project_id is not set".to_string()))?;
                log::info!("Document store: Firestore project {}", project_id);
                Arc::new(FirestoreClient::new(
                    project_id,
                    credential(config.documents.api_key_env.as_deref()),
                    credential(config.documents.access_token_env.as_deref()),
                )?)
            }
            DocumentsBackend::Sqlite => Arc::new(
                SqliteDocumentStore::open(config.db_path(), &config.documents.migrations_dir).await?,
            ),
            DocumentsBackend::Memory => {
                log::warn!("Document store: in-memory, records are lost on exit");
                Arc::new(MemoryDocumentStore::new())
            }
        };

        let mut ctx = Self::new(
            storage,
            documents,
            CatalogLayout::new(config.catalog.unit_kind, &config.catalog.root_collection),
            config.upload.failure_policy,
        );
        ctx.media_root = media_root;
        Ok(ctx)
    }

    /// Directory to serve under `/media` when the local object store is used
    pub fn media_root(&self) -> Option<&Path> {
        self.media_root.as_deref()
    }

    /// Flush the document store before the process exits
    pub async fn shutdown(&self) -> Result<()> {
        log::info!(
            "Closing backends (catalog '{}', {} units)",
            self.layout.root_collection,
            self.layout.unit_kind.doc_prefix()
        );
        self.documents.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_units_collection() {
        let layout = CatalogLayout::new(UnitKind::Chapter, "comics");
        assert_eq!(layout.units_collection("foo"), "comics/foo/chapters");
        assert_eq!(CatalogLayout::default().units_collection("foo"), "comics/foo/episodes");
    }

    #[tokio::test]
    async fn test_from_config_local_and_sqlite() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("media");
        let db_path = temp_dir.path().join("catalog.db");
        let config = Config::parse(&format!(
            r#"
[catalog]
unit_kind = "chapter"

[storage]
backend = "local"
local_root = "{}"

[documents]
backend = "sqlite"
db_path = "{}"
"#,
            root.display().to_string().replace('\\', "\\\\"),
            db_path.display().to_string().replace('\\', "\\\\"),
        ))
        .unwrap();

        let ctx = AppContext::from_config(&config).await.unwrap();
        assert_eq!(ctx.layout.unit_kind, UnitKind::Chapter);
        assert_eq!(ctx.media_root(), Some(root.as_path()));
        assert!(root.is_dir());
        assert!(db_path.exists());

        ctx.documents.set("comics", "foo", serde_json::json!({"title": "Foo"})).await.unwrap();
        ctx.shutdown().await.unwrap();
        let wal = temp_dir.path().join("catalog.db-wal");
        assert!(!wal.exists() || std::fs::metadata(&wal).unwrap().len() == 0);
    }
}
