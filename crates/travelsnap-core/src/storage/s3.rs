//! S3-compatible bucket backend (AWS S3, Cloudflare R2, MinIO).

use std::env;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use super::{normalize_content_type, normalize_object_key, storage_error, BlobStore};
use crate::auth::AuthSession;
use crate::util::is_http_url;
use crate::{Error, Result};

const ENV_ENDPOINT: &str = "TRAVELSNAP_S3_ENDPOINT";
const ENV_REGION: &str = "TRAVELSNAP_S3_REGION";
const ENV_BUCKET: &str = "TRAVELSNAP_S3_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "TRAVELSNAP_S3_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "TRAVELSNAP_S3_SECRET_ACCESS_KEY";
const ENV_PUBLIC_BASE_URL: &str = "TRAVELSNAP_S3_PUBLIC_BASE_URL";

const DEFAULT_REGION: &str = "auto";

/// S3-compatible bucket configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Config {
    /// Custom endpoint; `None` targets AWS itself.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Public URL base objects are served from.
    pub public_base_url: String,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl S3Config {
    /// Load the bucket configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no S3 variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }
}

#[derive(Clone, Debug)]
pub struct S3Storage {
    config: S3Config,
    client: Client,
}

impl S3Storage {
    #[must_use]
    pub fn new(config: S3Config) -> Self {
        let client = build_s3_client(&config);
        Self { config, client }
    }

    #[must_use]
    pub const fn config(&self) -> &S3Config {
        &self.config
    }

    /// Check that the configured bucket is reachable with current credentials.
    pub async fn bucket_is_reachable(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|error| storage_error("S3", "head_bucket", &self.config.bucket, error))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    async fn upload(
        &self,
        _session: &AuthSession,
        object_key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let object_key = normalize_object_key(object_key)?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = normalize_content_type(content_type) {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|error| {
            let target = format!("{}/{object_key}", self.config.bucket);
            storage_error("S3", "put_object", &target, error)
        })?;

        self.public_url(&object_key)
            .ok_or_else(|| Error::Storage(format!("No public URL for {object_key}")))
    }

    fn public_url(&self, object_key: &str) -> Option<String> {
        let key = object_key.trim().trim_matches('/');
        if key.is_empty() {
            return None;
        }
        Some(format!("{}/{key}", self.config.public_base_url))
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<S3Config>> {
    let read = |key| lookup(key).map(|value| value.trim().to_string());
    let endpoint = read(ENV_ENDPOINT);
    let region = read(ENV_REGION);
    let bucket = read(ENV_BUCKET);
    let access_key_id = read(ENV_ACCESS_KEY_ID);
    let secret_access_key = read(ENV_SECRET_ACCESS_KEY);
    let public_base_url = read(ENV_PUBLIC_BASE_URL);

    let any_present = endpoint.is_some()
        || region.is_some()
        || bucket.is_some()
        || access_key_id.is_some()
        || secret_access_key.is_some()
        || public_base_url.is_some();

    if !any_present {
        return Ok(None);
    }

    let present = |value: Option<String>| value.filter(|value| !value.is_empty());
    let bucket = present(bucket);
    let access_key_id = present(access_key_id);
    let secret_access_key = present(secret_access_key);
    let public_base_url = present(public_base_url);

    let mut missing = Vec::new();
    if bucket.is_none() {
        missing.push(ENV_BUCKET);
    }
    if access_key_id.is_none() {
        missing.push(ENV_ACCESS_KEY_ID);
    }
    if secret_access_key.is_none() {
        missing.push(ENV_SECRET_ACCESS_KEY);
    }
    if public_base_url.is_none() {
        missing.push(ENV_PUBLIC_BASE_URL);
    }

    let (Some(bucket), Some(access_key_id), Some(secret_access_key), Some(public_base_url)) =
        (bucket, access_key_id, secret_access_key, public_base_url)
    else {
        return Err(Error::InvalidInput(format!(
            "S3 configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    };

    Ok(Some(S3Config {
        endpoint: normalize_url(present(endpoint), ENV_ENDPOINT)?,
        region: present(region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
        bucket,
        access_key_id,
        secret_access_key,
        public_base_url: normalize_url(Some(public_base_url), ENV_PUBLIC_BASE_URL)?
            .unwrap_or_default(),
    }))
}

fn normalize_url(value: Option<String>, variable: &str) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if !is_http_url(&value) {
        return Err(Error::InvalidInput(format!(
            "{variable} must start with http:// or https://"
        )));
    }
    Ok(Some(value.trim_end_matches('/').to_string()))
}

fn build_s3_client(config: &S3Config) -> Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        "travelsnap-s3-storage",
    );

    let mut builder = aws_sdk_s3::config::Builder::new()
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials);
    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    Client::from_conf(builder.build())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<Option<S3Config>> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    fn complete() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (ENV_BUCKET, "travel-media"),
            (ENV_ACCESS_KEY_ID, "AKID123"),
            (ENV_SECRET_ACCESS_KEY, "SECRET123"),
            (ENV_PUBLIC_BASE_URL, "https://cdn.example.com/media/"),
        ])
    }

    #[test]
    fn parse_config_none_returns_none() {
        assert!(parse_from_map(&HashMap::new()).unwrap().is_none());
    }

    #[test]
    fn parse_config_requires_all_required_values() {
        let map = HashMap::from([(ENV_BUCKET, "bucket")]);

        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::InvalidInput(message) => {
                assert!(message.contains(ENV_ACCESS_KEY_ID));
                assert!(message.contains(ENV_SECRET_ACCESS_KEY));
                assert!(message.contains(ENV_PUBLIC_BASE_URL));
                assert!(!message.contains(ENV_BUCKET));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_config_defaults_region_and_normalizes_urls() {
        let mut map = complete();
        map.insert(ENV_ENDPOINT, "https://account.r2.cloudflarestorage.com/");

        let config = parse_from_map(&map).unwrap().unwrap();
        assert_eq!(config.region, "auto");
        assert_eq!(config.public_base_url, "https://cdn.example.com/media");
        assert_eq!(
            config.endpoint.as_deref(),
            Some("https://account.r2.cloudflarestorage.com")
        );
    }

    #[test]
    fn parse_config_rejects_invalid_public_base_url() {
        let mut map = complete();
        map.insert(ENV_PUBLIC_BASE_URL, "cdn.example.com/media");

        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::InvalidInput(message) => assert!(message.contains(ENV_PUBLIC_BASE_URL)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn public_url_joins_normalized_key() {
        let config = parse_from_map(&complete()).unwrap().unwrap();
        let storage = S3Storage::new(config);

        let url = storage.public_url("/post-images/u1/1-a.png").unwrap();
        assert_eq!(url, "https://cdn.example.com/media/post-images/u1/1-a.png");
        assert!(storage.public_url(" / ").is_none());
    }

    #[test]
    fn debug_redacts_secret() {
        let config = parse_from_map(&complete()).unwrap().unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("SECRET123"));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "Requires TRAVELSNAP_S3_* env vars plus network access"]
    async fn s3_bucket_exists_and_is_reachable() {
        let _ = dotenvy::dotenv();

        let config = S3Config::from_env()
            .expect("S3 env parsing should not error")
            .expect("S3 config should be present");
        let storage = S3Storage::new(config.clone());

        storage.bucket_is_reachable().await.unwrap_or_else(|error| {
            panic!(
                "S3 bucket health check failed for bucket '{}': {error}",
                config.bucket
            )
        });
    }
}
