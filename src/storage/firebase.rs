use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{validate_object_path, Listing, ObjectStore, StoredObject};
use crate::error::{ComicdeskError, Result};

const DEFAULT_ENDPOINT: &str = "https://firebasestorage.googleapis.com";

/// Response of the object list call
#[derive(Deserialize, Default)]
struct ListResponse {
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
}

/// Object metadata, returned by uploads and metadata lookups
#[derive(Deserialize)]
struct ObjectMetadata {
    name: String,
    #[serde(rename = "downloadTokens")]
    download_tokens: Option<String>,
}

/// Firebase Storage client (REST v0 API)
///
/// Talks to the same endpoints the Firebase web SDK uses: prefix/delimiter
/// listing, media uploads, and token-based download URLs.
pub struct FirebaseStorage {
    client: Client,
    endpoint: String,
    bucket: String,
    access_token: Option<String>,
}

impl FirebaseStorage {
    /// Create a new Firebase Storage client
    ///
    /// # Arguments
    ///
    /// * `bucket` - Storage bucket, e.g. "my-app.firebasestorage.app"
    /// * `access_token` - Optional OAuth bearer token; without it requests run
    ///   under the bucket's public security rules
    pub fn new(bucket: String, access_token: Option<String>) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string(), bucket, access_token)
    }

    /// Same as `new`, against a custom endpoint (e.g. the storage emulator)
    pub fn with_endpoint(endpoint: String, bucket: String, access_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ComicdeskError::Storage(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket,
            access_token,
        })
    }

    /// `<endpoint>/v0/b/<bucket>/o`, optionally followed by the encoded object path
    fn objects_url(&self, object: Option<&str>) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| ComicdeskError::Config(format!("Invalid storage endpoint: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ComicdeskError::Config("Storage endpoint cannot be a base".to_string()))?;
            segments.pop_if_empty().extend(["v0", "b", self.bucket.as_str(), "o"]);
            // The whole object path is one segment, so '/' becomes %2F
            if let Some(object) = object {
                segments.push(object);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Build the public download URL from object metadata
    fn url_from_metadata(&self, metadata: &ObjectMetadata) -> Result<String> {
        let token = metadata
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ComicdeskError::Storage(format!("Object {} has no download token", metadata.name))
            })?;

        let mut url = self.objects_url(Some(&metadata.name))?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", token);
        Ok(url.to_string())
    }

    async fn read_error(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        format!("Firebase Storage error {}: {}", status, body)
    }
}

#[async_trait]
impl ObjectStore for FirebaseStorage {
    async fn list(&self, folder: &str) -> Result<Listing> {
        let prefix = match folder.trim_end_matches('/') {
            "" => String::new(),
            f => format!("{}/", f),
        };

        let mut listing = Listing::default();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.objects_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", &prefix).append_pair("delimiter", "/");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self
                .authorize(self.client.get(url))
                .send()
                .await
                .map_err(|e| ComicdeskError::Storage(format!("Network error: {}", e)))?;

            if !response.status().is_success() {
                return Err(ComicdeskError::Storage(Self::read_error(response).await));
            }

            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| ComicdeskError::Storage(format!("Failed to parse list response: {}", e)))?;

            listing
                .folders
                .extend(page.prefixes.into_iter().map(|p| p.trim_end_matches('/').to_string()));
            listing.files.extend(page.items.into_iter().map(|item| StoredObject {
                name: item.name.rsplit('/').next().unwrap_or(&item.name).to_string(),
                path: item.name,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        log::debug!(
            "Listed '{}': {} folders, {} files",
            folder,
            listing.folders.len(),
            listing.files.len()
        );
        Ok(listing)
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        validate_object_path(path)?;

        let mut url = self.objects_url(None)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);

        let size = bytes.len();
        let response = self
            .authorize(self.client.post(url))
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ComicdeskError::Storage(format!("Network error uploading {}: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(ComicdeskError::Storage(Self::read_error(response).await));
        }

        log::debug!("Uploaded {} ({} bytes)", path, size);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        let url = self.objects_url(Some(path))?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| ComicdeskError::Storage(format!("Network error: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ComicdeskError::NotFound(format!("Object does not exist: {}", path)));
        }
        if !response.status().is_success() {
            return Err(ComicdeskError::Storage(Self::read_error(response).await));
        }

        let metadata: ObjectMetadata = response
            .json()
            .await
            .map_err(|e| ComicdeskError::Storage(format!("Failed to parse object metadata: {}", e)))?;

        self.url_from_metadata(&metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FirebaseStorage {
        FirebaseStorage::new("katha-test.firebasestorage.app".to_string(), None).unwrap()
    }

    #[test]
    fn test_objects_url_encodes_path_as_one_segment() {
        let url = client().objects_url(Some("foo/Episode 01/001.png")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://firebasestorage.googleapis.com/v0/b/katha-test.firebasestorage.app/o/foo%2FEpisode%2001%2F001.png"
        );
    }

    #[test]
    fn test_url_from_metadata_uses_first_token() {
        let metadata = ObjectMetadata {
            name: "foo/cover.png".to_string(),
            download_tokens: Some("tok-a,tok-b".to_string()),
        };
        let url = client().url_from_metadata(&metadata).unwrap();
        assert!(url.ends_with("/o/foo%2Fcover.png?alt=media&token=tok-a"));
    }

    #[test]
    fn test_url_from_metadata_without_token() {
        let metadata = ObjectMetadata {
            name: "foo/cover.png".to_string(),
            download_tokens: None,
        };
        assert!(matches!(
            client().url_from_metadata(&metadata),
            Err(ComicdeskError::Storage(_))
        ));
    }

    #[test]
    fn test_list_response_parsing() {
        let body = r#"{
            "prefixes": ["foo/Episode 01/"],
            "items": [{"name": "foo/cover.png", "bucket": "b"}]
        }"#;
        let page: ListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.prefixes, vec!["foo/Episode 01/".to_string()]);
        assert_eq!(page.items[0].name, "foo/cover.png");
        assert!(page.next_page_token.is_none());

        let empty: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }
}
