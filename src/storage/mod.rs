//! Object store abstraction.
//!
//! The dashboard only needs three operations from the store: a non-recursive
//! listing of one folder, a single-object upload, and resolution of a public
//! download URL. Folders are addressed without a trailing slash; the empty
//! string is the bucket root.

pub mod firebase;
pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use firebase::FirebaseStorage;
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

/// A file directly inside a listed folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    /// Last path component
    pub name: String,
    /// Full path from the bucket root
    pub path: String,
}

/// One level of the storage folder tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// Full paths of the sub-folders, without trailing slash
    pub folders: Vec<String>,
    pub files: Vec<StoredObject>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the direct children of `folder` ("" for the root).
    async fn list(&self, folder: &str) -> Result<Listing>;

    /// Upload `bytes` to `path`, replacing any existing object.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Resolve the public download URL of an existing object.
    async fn download_url(&self, path: &str) -> Result<String>;
}

/// Join a folder and a child name into a full storage path
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Reject paths the convention can never produce (empty segments, dot segments)
pub fn validate_object_path(path: &str) -> Result<()> {
    let bad = path.is_empty()
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(crate::error::ComicdeskError::Validation(format!(
            "Invalid storage path: '{}'",
            path
        )));
    }
    Ok(())
}
