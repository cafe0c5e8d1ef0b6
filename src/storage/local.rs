use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{join_path, validate_object_path, Listing, ObjectStore, StoredObject};
use crate::error::{ComicdeskError, Result};

/// Object store backed by a directory on the local filesystem.
///
/// Download URLs point at `public_base_url`, which the dashboard server exposes
/// under `/media`. Each URL carries a content hash so replaced objects get a
/// fresh URL, the same way Firebase rotates download tokens.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: url::Url,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P, public_base_url: &str) -> Result<Self> {
        let public_base_url = url::Url::parse(public_base_url).map_err(|e| {
            ComicdeskError::Config(format!("Invalid public base URL {}: {}", public_base_url, e))
        })?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            public_base_url,
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, folder: &str) -> Result<Listing> {
        let folder = folder.trim_end_matches('/');
        if !folder.is_empty() {
            validate_object_path(folder)?;
        }
        let dir = self.resolve(folder);

        // A folder that was never written to lists as empty, like a bucket prefix
        if !dir.is_dir() {
            return Ok(Listing::default());
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut listing = Listing::default();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                listing.folders.push(join_path(folder, &name));
            } else if file_type.is_file() {
                listing.files.push(StoredObject {
                    path: join_path(folder, &name),
                    name,
                });
            }
        }

        listing.folders.sort();
        listing.files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        validate_object_path(path)?;
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        log::debug!("local store: wrote {}", target.display());
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        validate_object_path(path)?;
        let target = self.resolve(path);
        let bytes = tokio::fs::read(&target).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ComicdeskError::NotFound(format!("Object does not exist: {}", path))
            }
            _ => ComicdeskError::Io(e),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = format!("{:x}", hasher.finalize());

        let mut url = self.public_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ComicdeskError::Config("public base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(path.split('/'));
        url.set_query(Some(&format!("v={}", &digest[..16])));

        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> LocalObjectStore {
        LocalObjectStore::new(temp_dir.path(), "http://127.0.0.1:8080/media").unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.upload("foo/cover.png", vec![1, 2], "image/png").await.unwrap();
        store.upload("foo/Episode 01/001.png", vec![3], "image/png").await.unwrap();

        let root = store.list("").await.unwrap();
        assert_eq!(root.folders, vec!["foo".to_string()]);

        let foo = store.list("foo").await.unwrap();
        assert_eq!(foo.folders, vec!["foo/Episode 01".to_string()]);
        assert_eq!(foo.files.len(), 1);
        assert_eq!(foo.files[0].path, "foo/cover.png");
        assert!(temp_dir.path().join("foo/Episode 01/001.png").exists());
    }

    #[tokio::test]
    async fn test_missing_folder_lists_empty() {
        let temp_dir = TempDir::new().unwrap();
        let listing = store(&temp_dir).list("ghost").await.unwrap();
        assert_eq!(listing, Listing::default());
    }

    #[tokio::test]
    async fn test_download_url_encodes_and_versions() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.upload("foo/Episode 01/001.png", vec![9], "image/png").await.unwrap();

        let first = store.download_url("foo/Episode 01/001.png").await.unwrap();
        assert!(first.starts_with("http://127.0.0.1:8080/media/foo/Episode%2001/001.png?v="));

        store.upload("foo/Episode 01/001.png", vec![10], "image/png").await.unwrap();
        let second = store.download_url("foo/Episode 01/001.png").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let result = store(&temp_dir).upload("../escape.png", vec![1], "image/png").await;
        assert!(matches!(result, Err(ComicdeskError::Validation(_))));
    }
}
