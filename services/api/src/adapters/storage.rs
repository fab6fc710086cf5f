//! services/api/src/adapters/storage.rs
//!
//! Implements the `ObjectStorage` port over the Firebase Storage REST API.
//! Uploads use the simple media upload, and the durable download URL is built
//! from the object's first download token.

use async_trait::async_trait;
use memoria_core::domain::ImageFile;
use memoria_core::ports::{ObjectStorage, PortError, PortResult};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{info, instrument};

use super::http::{check, transport_error, ApiFailure};

pub struct FirebaseStorage {
    client: Client,
    base_url: String,
    bucket: String,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectRecord {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

impl FirebaseStorage {
    pub fn new(client: Client, bucket: &str, token: Option<String>) -> Self {
        Self::with_base_url(client, "https://firebasestorage.googleapis.com", bucket, token)
    }

    pub fn with_base_url(client: Client, base_url: &str, bucket: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token,
        }
    }

    fn bucket_url(&self) -> PortResult<Url> {
        Url::parse(&format!("{}/v0/b/{}/o", self.base_url, self.bucket))
            .map_err(|e| PortError::platform("storage/invalid-url", e.to_string()))
    }

    /// `.../o/<object path, '/' escaped>?alt=media&token=<token>`
    fn download_url(&self, object: &str, token: &str) -> PortResult<String> {
        let mut url = self.bucket_url()?;
        url.path_segments_mut()
            .map_err(|_| PortError::platform("storage/invalid-url", self.base_url.clone()))?
            .push(object);
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", token);
        Ok(url.to_string())
    }
}

fn storage_error(failure: ApiFailure) -> PortError {
    let code = match failure.status {
        StatusCode::UNAUTHORIZED => "storage/unauthenticated",
        StatusCode::FORBIDDEN => "storage/unauthorized",
        StatusCode::NOT_FOUND => "storage/object-not-found",
        StatusCode::TOO_MANY_REQUESTS => "storage/retry-limit-exceeded",
        StatusCode::INSUFFICIENT_STORAGE => "storage/quota-exceeded",
        StatusCode::BAD_REQUEST | StatusCode::UNSUPPORTED_MEDIA_TYPE => "storage/invalid-format",
        StatusCode::SERVICE_UNAVAILABLE => "unavailable",
        _ => "storage/unknown",
    };
    PortError::platform(code, failure.message)
}

#[async_trait]
impl ObjectStorage for FirebaseStorage {
    #[instrument(skip(self, file), fields(size = file.size()))]
    async fn upload(&self, path: &str, file: &ImageFile) -> PortResult<String> {
        let mut request = self
            .client
            .post(self.bucket_url()?)
            .query(&[("uploadType", "media"), ("name", path)])
            .header(CONTENT_TYPE, file.mime_type.as_str())
            .body(file.bytes.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let record: ObjectRecord = check(response)
            .await
            .map_err(storage_error)?
            .json()
            .await
            .map_err(transport_error)?;

        let token = record
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PortError::platform("storage/unknown", "upload returned no download token"))?;
        let url = self.download_url(&record.name, token)?;
        info!(object = %record.name, "Object stored");
        Ok(url)
    }
}
