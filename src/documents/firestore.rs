//! Firestore REST (v1) client.
//!
//! Firestore stores typed values (`{"stringValue": ...}`, `{"arrayValue": ...}`);
//! this module converts them to and from plain JSON so the rest of the crate
//! only ever sees `serde_json::Value` objects.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{check_write, Document, DocumentStore};
use crate::error::{ComicdeskError, Result};

const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com";
const PAGE_SIZE: &str = "300";

#[derive(Deserialize)]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl RawDocument {
    fn into_document(self) -> Result<Document> {
        let id = self.name.rsplit('/').next().unwrap_or(&self.name).to_string();
        Ok(Document {
            id,
            data: decode_fields(&self.fields)?,
        })
    }
}

/// Firestore client for the `(default)` database of one project
pub struct FirestoreClient {
    client: Client,
    endpoint: String,
    project_id: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl FirestoreClient {
    pub fn new(project_id: String, api_key: Option<String>, access_token: Option<String>) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string(), project_id, api_key, access_token)
    }

    /// Same as `new`, against a custom endpoint (e.g. the Firestore emulator)
    pub fn with_endpoint(
        endpoint: String,
        project_id: String,
        api_key: Option<String>,
        access_token: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ComicdeskError::Documents(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id,
            api_key,
            access_token,
        })
    }

    /// `.../documents/<collection path>[/<id>]`
    fn document_url(&self, collection: &str, id: Option<&str>) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| ComicdeskError::Config(format!("Invalid Firestore endpoint: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ComicdeskError::Config("Firestore endpoint cannot be a base".to_string()))?;
            segments
                .pop_if_empty()
                .extend(["v1", "projects", self.project_id.as_str(), "databases", "(default)", "documents"])
                .extend(collection.split('/'));
            if let Some(id) = id {
                segments.push(id);
            }
        }
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| ComicdeskError::Documents(format!("Network error: {}", e)))
    }

    async fn read_error(response: reqwest::Response) -> ComicdeskError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        ComicdeskError::Documents(format!("Firestore error {}: {}", status, body))
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.document_url(collection, None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.send(self.client.get(url)).await?;
            if !response.status().is_success() {
                return Err(Self::read_error(response).await);
            }

            let page: ListDocumentsResponse = response
                .json()
                .await
                .map_err(|e| ComicdeskError::Documents(format!("Failed to parse response: {}", e)))?;

            for raw in page.documents {
                documents.push(raw.into_document()?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        log::debug!("Fetched {} documents from {}", documents.len(), collection);
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let url = self.document_url(collection, Some(id))?;
        let response = self.send(self.client.get(url)).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let raw: RawDocument = response
            .json()
            .await
            .map_err(|e| ComicdeskError::Documents(format!("Failed to parse response: {}", e)))?;
        raw.into_document().map(Some)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        check_write(collection, id, &data)?;

        // PATCH without an update mask replaces the whole document (or creates it)
        let url = self.document_url(collection, Some(id))?;
        let body = json!({ "fields": encode_fields(&data) });
        let response = self.send(self.client.patch(url).json(&body)).await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        log::debug!("Wrote {}/{}", collection, id);
        Ok(())
    }
}

/// Encode a JSON object as a Firestore `fields` map
pub fn encode_fields(data: &Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), encode_value(value)))
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}

/// Encode one JSON value as a Firestore typed value
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // Firestore transports 64-bit integers as strings
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(_) => json!({ "mapValue": { "fields": encode_fields(value) } }),
    }
}

/// Decode a Firestore `fields` map into a JSON object
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Value> {
    let mut out = Map::new();
    for (key, value) in fields {
        out.insert(key.clone(), decode_value(value)?);
    }
    Ok(Value::Object(out))
}

/// Decode one Firestore typed value
pub fn decode_value(value: &Value) -> Result<Value> {
    let typed = value
        .as_object()
        .and_then(|map| map.iter().next())
        .map(|(kind, inner)| (kind.as_str(), inner))
        .ok_or_else(|| ComicdeskError::Documents(format!("Malformed Firestore value: {}", value)))?;

    match typed {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", v) => Ok(Value::Bool(v.as_bool().unwrap_or_default())),
        ("integerValue", Value::String(s)) => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| ComicdeskError::Documents(format!("Bad integerValue: {}", s))),
        ("integerValue", v) => Ok(v.clone()),
        ("doubleValue", v) => Ok(v.clone()),
        ("stringValue", v)
        | ("timestampValue", v)
        | ("referenceValue", v)
        | ("bytesValue", v) => Ok(v.clone()),
        ("geoPointValue", v) => Ok(v.clone()),
        ("arrayValue", v) => {
            let items = v
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(items))
        }
        ("mapValue", v) => match v.get("fields").and_then(Value::as_object) {
            Some(fields) => decode_fields(fields),
            None => Ok(Value::Object(Map::new())),
        },
        (other, _) => Err(ComicdeskError::Documents(format!("Unsupported Firestore value type: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FirestoreClient {
        FirestoreClient::new("katha-test".to_string(), Some("web-key".to_string()), None).unwrap()
    }

    #[test]
    fn test_document_url() {
        let url = client().document_url("comics/Moon Hunter/episodes", Some("episode01")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/katha-test/databases/(default)/documents/comics/Moon%20Hunter/episodes/episode01?key=web-key"
        );
    }

    #[test]
    fn test_encode_title_record() {
        let encoded = encode_fields(&json!({
            "title": "Foo",
            "genre": ["Action", "Drama"],
            "isHero": true,
            "number": 3
        }));
        assert_eq!(encoded["title"], json!({"stringValue": "Foo"}));
        assert_eq!(encoded["isHero"], json!({"booleanValue": true}));
        assert_eq!(encoded["number"], json!({"integerValue": "3"}));
        assert_eq!(
            encoded["genre"],
            json!({"arrayValue": {"values": [{"stringValue": "Action"}, {"stringValue": "Drama"}]}})
        );
    }

    #[test]
    fn test_decode_document() {
        let raw: RawDocument = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/comics/foo/episodes/episode02",
            "fields": {
                "number": {"integerValue": "2"},
                "title": {"stringValue": "Second"},
                "images": {"arrayValue": {}},
                "meta": {"mapValue": {"fields": {"ratio": {"doubleValue": 1.5}}}},
                "deleted": {"nullValue": null}
            },
            "createTime": "2025-01-01T00:00:00Z"
        }))
        .unwrap();

        let doc = raw.into_document().unwrap();
        assert_eq!(doc.id, "episode02");
        assert_eq!(doc.data["number"], json!(2));
        assert_eq!(doc.data["title"], json!("Second"));
        assert_eq!(doc.data["images"], json!([]));
        assert_eq!(doc.data["meta"]["ratio"], json!(1.5));
        assert_eq!(doc.data["deleted"], Value::Null);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode_value(&json!({"mysteryValue": 1})).is_err());
        assert!(decode_value(&json!("bare")).is_err());
    }

    #[test]
    fn test_empty_list_response() {
        let page: ListDocumentsResponse = serde_json::from_str("{}").unwrap();
        assert!(page.documents.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
