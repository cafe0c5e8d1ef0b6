use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::{validate_object_path, Listing, ObjectStore, StoredObject};
use crate::error::{ComicdeskError, Result};

#[derive(Debug, Clone)]
struct MemoryObject {
    content_type: String,
    token: String,
}

/// In-process object store.
///
/// Used for dry runs and tests. Uploads whose path contains one of the
/// registered failure patterns are rejected, which lets callers exercise
/// partial batch failures without a network.
pub struct MemoryObjectStore {
    base_url: String,
    objects: Mutex<BTreeMap<String, MemoryObject>>,
    failing: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_base_url("memory://bucket")
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(Vec::new()),
        }
    }

    /// Make every upload whose path contains `pattern` fail
    pub fn fail_uploads_containing(&self, pattern: &str) {
        self.failing.lock().unwrap().push(pattern.to_string());
    }

    /// Seed an object directly (bypasses failure injection)
    pub fn insert(&self, path: &str) {
        self.objects.lock().unwrap().insert(
            path.to_string(),
            MemoryObject {
                content_type: "application/octet-stream".to_string(),
                token: Uuid::new_v4().to_string(),
            },
        );
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects.lock().unwrap().get(path).map(|o| o.content_type.clone())
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, folder: &str) -> Result<Listing> {
        let prefix = match folder.trim_end_matches('/') {
            "" => String::new(),
            f => format!("{}/", f),
        };

        let objects = self.objects.lock().unwrap();
        let mut folders = BTreeSet::new();
        let mut files = Vec::new();

        for path in objects.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    folders.insert(format!("{}{}", prefix, child));
                }
                None => files.push(StoredObject {
                    name: rest.to_string(),
                    path: path.clone(),
                }),
            }
        }

        Ok(Listing {
            folders: folders.into_iter().collect(),
            files,
        })
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        validate_object_path(path)?;

        let should_fail = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| path.contains(pattern.as_str()));
        if should_fail {
            return Err(ComicdeskError::Storage(format!("Upload rejected for {}", path)));
        }

        // Yield so concurrently issued uploads actually interleave
        tokio::task::yield_now().await;

        self.objects.lock().unwrap().insert(
            path.to_string(),
            MemoryObject {
                content_type: content_type.to_string(),
                token: Uuid::new_v4().to_string(),
            },
        );
        log::debug!("memory store: stored {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(path)
            .ok_or_else(|| ComicdeskError::NotFound(format!("Object does not exist: {}", path)))?;
        Ok(format!("{}/{}?token={}", self.base_url, path.replace(' ', "%20"), object.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_splits_folders_and_files() {
        let store = MemoryObjectStore::new();
        store.insert("foo/cover.png");
        store.insert("foo/Episode 01/001.png");
        store.insert("foo/Episode 01/002.png");
        store.insert("bar/x.png");

        let root = store.list("").await.unwrap();
        assert_eq!(root.folders, vec!["bar".to_string(), "foo".to_string()]);
        assert!(root.files.is_empty());

        let foo = store.list("foo").await.unwrap();
        assert_eq!(foo.folders, vec!["foo/Episode 01".to_string()]);
        assert_eq!(foo.files.len(), 1);
        assert_eq!(foo.files[0].name, "cover.png");
        assert_eq!(foo.files[0].path, "foo/cover.png");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryObjectStore::new();
        store.fail_uploads_containing("bad");
        assert!(store.upload("foo/bad.png", vec![1], "image/png").await.is_err());
        assert!(store.upload("foo/good.png", vec![1], "image/png").await.is_ok());
        assert!(!store.contains("foo/bad.png"));
        assert_eq!(store.content_type("foo/good.png").as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_download_url_missing_object() {
        let store = MemoryObjectStore::new();
        let err = store.download_url("nope.png").await.unwrap_err();
        assert!(matches!(err, ComicdeskError::NotFound(_)));
    }
}
