//! Object storage client
//!
//! Upload, download, list and delete objects in storage buckets. Uploads
//! can be given collision-free names with [`StorageClient::upload_unique`].

use std::sync::Arc;

use bytes::Bytes;
use reqwest::{RequestBuilder, Response};
use roomkit_core::FileNameGenerator;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use url::Url;

use crate::client::Shared;
use crate::error::{ClientError, ClientResult};

/// Where an uploaded object lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub bucket: String,
    /// Path inside the bucket
    pub path: String,
    /// `<bucket>/<path>` as reported by the server
    pub full_path: String,
    pub id: Option<String>,
}

/// One entry of a bucket listing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageObject {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
    #[serde(rename = "Id", alias = "id")]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
    #[serde(rename = "sortBy")]
    sort_by: Value,
}

#[derive(Clone, Debug)]
pub struct StorageClient {
    shared: Shared,
    names: Arc<FileNameGenerator>,
}

impl StorageClient {
    pub(crate) fn new(shared: Shared) -> Self {
        Self {
            shared,
            names: Arc::new(FileNameGenerator::new()),
        }
    }

    /// Store `bytes` at `bucket/path`. Fails if the object exists.
    #[instrument(skip(self, bytes))]
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: impl Into<Bytes>,
        content_type: &str,
    ) -> ClientResult<ObjectDescriptor> {
        let bytes = bytes.into();
        let path = path.trim_start_matches('/');
        let request = self
            .shared
            .http
            .post(self.object_url(&["object"], bucket, path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);

        let response = self.send(request).await?;
        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        info!(bucket = %bucket, path = %path, "Object uploaded");
        Ok(ObjectDescriptor {
            bucket: bucket.to_string(),
            path: path.to_string(),
            full_path: uploaded.key.unwrap_or_else(|| format!("{bucket}/{path}")),
            id: uploaded.id,
        })
    }

    /// Upload under a generated name: `dir/photo.png` becomes `dir/photo_<id>.png`
    pub async fn upload_unique(
        &self,
        bucket: &str,
        dir: &str,
        file_name: &str,
        bytes: impl Into<Bytes>,
        content_type: &str,
    ) -> ClientResult<ObjectDescriptor> {
        let name = self.names.generate(file_name);
        let dir = dir.trim_matches('/');
        let path = if dir.is_empty() {
            name
        } else {
            format!("{dir}/{name}")
        };
        self.upload(bucket, &path, bytes, content_type).await
    }

    pub async fn download(&self, bucket: &str, path: &str) -> ClientResult<Bytes> {
        let request = self
            .shared
            .http
            .get(self.object_url(&["object"], bucket, path));
        Ok(self.send(request).await?.bytes().await?)
    }

    /// Remove objects; returns the ones the server reports as deleted
    pub async fn delete(&self, bucket: &str, paths: &[&str]) -> ClientResult<Vec<StorageObject>> {
        let request = self
            .shared
            .http
            .delete(self.object_url(&["object"], bucket, ""))
            .json(&json!({ "prefixes": paths }));

        let removed: Vec<StorageObject> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        debug!(bucket = %bucket, count = removed.len(), "Objects deleted");
        Ok(removed)
    }

    /// Objects under `prefix`, sorted by name
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        limit: u32,
        offset: u32,
    ) -> ClientResult<Vec<StorageObject>> {
        let body = ListRequest {
            prefix: prefix.trim_matches('/'),
            limit,
            offset,
            sort_by: json!({ "column": "name", "order": "asc" }),
        };
        let request = self
            .shared
            .http
            .post(self.object_url(&["object", "list"], bucket, ""))
            .json(&body);

        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// URL of an object in a public bucket. No request is made.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        self.object_url(&["object", "public"], bucket, path).into()
    }

    /// `/storage/v1/<route>/<bucket>/<path>`. Every piece is encoded as a
    /// single segment, so `#`, `?` and spaces stay part of the object name.
    fn object_url(&self, route: &[&str], bucket: &str, path: &str) -> Url {
        let segments = ["storage", "v1"]
            .into_iter()
            .chain(route.iter().copied())
            .chain(std::iter::once(bucket))
            .chain(path.split('/').filter(|s| !s.is_empty()));
        self.shared.endpoint(segments)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let request = self
            .shared
            .with_api_key(request)
            .bearer_auth(self.shared.bearer());
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = ["message", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map_or_else(|| status.to_string(), str::to_string);
        Err(ClientError::Storage {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::SessionStore;

    fn storage() -> StorageClient {
        let config = ClientConfig::new("https://proj.supabase.co", "anon", "http://localhost:8000");
        StorageClient::new(
            Shared::new(reqwest::Client::new(), config, SessionStore::in_memory()).unwrap(),
        )
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            storage().public_url("avatars", "/u-1/photo.png"),
            "https://proj.supabase.co/storage/v1/object/public/avatars/u-1/photo.png"
        );
    }

    #[test]
    fn test_object_url_encodes_names() {
        let url = storage().object_url(&["object"], "docs", "u-1/report #2?.pdf");

        assert_eq!(url.path(), "/storage/v1/object/docs/u-1/report%20%232%3F.pdf");
        assert!(url.fragment().is_none());
        assert!(url.query().is_none());
        assert_eq!(
            storage().public_url("my bucket", "a#b.png"),
            "https://proj.supabase.co/storage/v1/object/public/my%20bucket/a%23b.png"
        );
    }

    #[test]
    fn test_bucket_routes() {
        let storage = storage();
        assert_eq!(
            storage.object_url(&["object", "list"], "avatars", "").path(),
            "/storage/v1/object/list/avatars"
        );
        assert_eq!(
            storage.object_url(&["object"], "avatars", "//u-1//a.png").path(),
            "/storage/v1/object/avatars/u-1/a.png"
        );
    }

    #[test]
    fn test_upload_response_key() {
        let uploaded: UploadResponse =
            serde_json::from_str(r#"{"Key":"avatars/a.png","Id":"obj-1"}"#).unwrap();
        assert_eq!(uploaded.key.as_deref(), Some("avatars/a.png"));
        assert_eq!(uploaded.id.as_deref(), Some("obj-1"));
    }

    #[test]
    fn test_list_request_body() {
        let body = serde_json::to_value(ListRequest {
            prefix: "u-1",
            limit: 100,
            offset: 0,
            sort_by: json!({ "column": "name", "order": "asc" }),
        })
        .unwrap();
        assert_eq!(body["sortBy"]["column"], "name");
        assert_eq!(body["limit"], 100);
    }
}
