//! Firebase Storage REST backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{normalize_content_type, normalize_object_key, BlobStore};
use crate::auth::AuthSession;
use crate::config::{normalize_endpoint_url, BackendConfig};
use crate::util::error_excerpt;
use crate::{Error, Result};

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct FirebaseStorageClient {
    storage_url: String,
    bucket: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    download_tokens: Option<String>,
}

impl FirebaseStorageClient {
    pub fn new(storage_url: &str, bucket: impl Into<String>) -> Result<Self> {
        let storage_url = normalize_endpoint_url(storage_url).ok_or_else(|| {
            Error::InvalidInput("Storage URL must include http:// or https://".to_string())
        })?;
        let bucket = bucket.into().trim().to_string();
        if bucket.is_empty() {
            return Err(Error::InvalidInput(
                "Storage bucket must not be empty".to_string(),
            ));
        }

        Ok(Self {
            storage_url,
            bucket,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()?,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.endpoints.storage_url, config.storage_bucket.clone())
    }

    fn bucket_url(&self) -> String {
        format!("{}/v0/b/{}/o", self.storage_url, self.bucket)
    }

    fn object_url(&self, object_key: &str, token: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}?alt=media",
            self.bucket_url(),
            urlencoding::encode(object_key)
        );
        if let Some(token) = token {
            url.push_str("&token=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }
}

#[async_trait]
impl BlobStore for FirebaseStorageClient {
    async fn upload(
        &self,
        session: &AuthSession,
        object_key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let object_key = normalize_object_key(object_key)?;
        let content_type = normalize_content_type(content_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let response = self
            .client
            .post(self.bucket_url())
            .query(&[("uploadType", "media"), ("name", object_key.as_str())])
            .bearer_auth(&session.id_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!(
                "Firebase Storage upload failed for {object_key} with HTTP {}: {}",
                status.as_u16(),
                error_excerpt(&body)
            );
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::PermissionDenied(message)
                }
                _ => Error::Storage(message),
            });
        }

        let uploaded = response.json::<UploadResponse>().await?;
        let token = uploaded
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').map(str::trim).find(|t| !t.is_empty()));
        Ok(self.object_url(&uploaded.name, token))
    }

    fn public_url(&self, object_key: &str) -> Option<String> {
        let key = normalize_object_key(object_key).ok()?;
        Some(self.object_url(&key, None))
    }
}
