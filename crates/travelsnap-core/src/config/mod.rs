//! Backend configuration for TravelSnap clients.
//!
//! Provides a unified `BackendConfig` used by every client to reach the
//! identity service, the document store and blob storage.

use std::env;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com";
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_STORAGE_URL: &str = "https://firebasestorage.googleapis.com";

const ENV_API_KEY: &str = "TRAVELSNAP_API_KEY";
const ENV_PROJECT_ID: &str = "TRAVELSNAP_PROJECT_ID";
const ENV_STORAGE_BUCKET: &str = "TRAVELSNAP_STORAGE_BUCKET";
const ENV_DEFAULT_PROFILE_PICTURE_URL: &str = "TRAVELSNAP_DEFAULT_PROFILE_PICTURE_URL";
const ENV_IDENTITY_URL: &str = "TRAVELSNAP_IDENTITY_URL";
const ENV_SECURE_TOKEN_URL: &str = "TRAVELSNAP_SECURE_TOKEN_URL";
const ENV_FIRESTORE_URL: &str = "TRAVELSNAP_FIRESTORE_URL";
const ENV_STORAGE_URL: &str = "TRAVELSNAP_STORAGE_URL";

/// Base URLs of the backend REST APIs. Overridable for emulators and tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoints {
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    #[serde(default = "default_secure_token_url")]
    pub secure_token_url: String,
    #[serde(default = "default_firestore_url")]
    pub firestore_url: String,
    #[serde(default = "default_storage_url")]
    pub storage_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            identity_url: default_identity_url(),
            secure_token_url: default_secure_token_url(),
            firestore_url: default_firestore_url(),
            storage_url: default_storage_url(),
        }
    }
}

impl Endpoints {
    /// Point every service at the same base URL (e.g. a local emulator or mock server).
    #[must_use]
    pub fn all(base_url: &str) -> Self {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        Self {
            identity_url: base_url.clone(),
            secure_token_url: base_url.clone(),
            firestore_url: base_url.clone(),
            storage_url: base_url,
        }
    }
}

/// Client-side backend configuration.
///
/// These values are the public project identifiers a client ships with.
/// Secret credentials must never be stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub api_key: String,
    pub project_id: String,
    pub storage_bucket: String,
    /// Picture assigned to newly provisioned profiles
    #[serde(default)]
    pub default_profile_picture_url: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl BackendConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no backend variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// Trim values, normalize URLs and reject incomplete configurations.
    pub fn validated(self) -> Result<Self> {
        let mut missing = Vec::new();
        let api_key = normalize_text_option(Some(self.api_key));
        let project_id = normalize_text_option(Some(self.project_id));
        let storage_bucket = normalize_text_option(Some(self.storage_bucket));
        if api_key.is_none() {
            missing.push("api_key");
        }
        if project_id.is_none() {
            missing.push("project_id");
        }
        if storage_bucket.is_none() {
            missing.push("storage_bucket");
        }
        let (Some(api_key), Some(project_id), Some(storage_bucket)) =
            (api_key, project_id, storage_bucket)
        else {
            return Err(Error::InvalidInput(format!(
                "Backend configuration is incomplete. Missing: {}",
                missing.join(", ")
            )));
        };

        let default_profile_picture_url =
            match normalize_text_option(self.default_profile_picture_url) {
                Some(url) => Some(require_http_url(&url, "default_profile_picture_url")?),
                None => None,
            };

        Ok(Self {
            api_key,
            project_id,
            storage_bucket,
            default_profile_picture_url,
            endpoints: Endpoints {
                identity_url: require_http_url(&self.endpoints.identity_url, "identity_url")?,
                secure_token_url: require_http_url(
                    &self.endpoints.secure_token_url,
                    "secure_token_url",
                )?,
                firestore_url: require_http_url(&self.endpoints.firestore_url, "firestore_url")?,
                storage_url: require_http_url(&self.endpoints.storage_url, "storage_url")?,
            },
        })
    }
}

/// Parse the web config object the Firebase console hands out
/// (`apiKey`, `authDomain`, `projectId`, `storageBucket`, ...).
pub fn parse_firebase_web_config(payload: &str) -> Result<BackendConfig> {
    let web_config: FirebaseWebConfig = serde_json::from_str(payload)
        .map_err(|error| Error::InvalidInput(format!("invalid Firebase web config: {error}")))?;

    BackendConfig {
        api_key: web_config.api_key.unwrap_or_default(),
        project_id: web_config.project_id.unwrap_or_default(),
        storage_bucket: web_config.storage_bucket.unwrap_or_default(),
        default_profile_picture_url: None,
        endpoints: Endpoints::default(),
    }
    .validated()
}

/// Trim a base URL and drop trailing slashes; `None` unless it is http(s).
pub fn normalize_endpoint_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if is_http_url(trimmed) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Private
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseWebConfig {
    api_key: Option<String>,
    project_id: Option<String>,
    storage_bucket: Option<String>,
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<BackendConfig>> {
    let api_key = lookup(ENV_API_KEY).map(|value| value.trim().to_string());
    let project_id = lookup(ENV_PROJECT_ID).map(|value| value.trim().to_string());
    let storage_bucket = lookup(ENV_STORAGE_BUCKET).map(|value| value.trim().to_string());

    if api_key.is_none() && project_id.is_none() && storage_bucket.is_none() {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if api_key.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_API_KEY);
    }
    if project_id.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_PROJECT_ID);
    }
    if storage_bucket.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_STORAGE_BUCKET);
    }
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Backend configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let defaults = Endpoints::default();
    let endpoint = |key: &str, fallback: String| {
        normalize_text_option(lookup(key)).unwrap_or(fallback)
    };

    BackendConfig {
        api_key: api_key.unwrap_or_default(),
        project_id: project_id.unwrap_or_default(),
        storage_bucket: storage_bucket.unwrap_or_default(),
        default_profile_picture_url: lookup(ENV_DEFAULT_PROFILE_PICTURE_URL),
        endpoints: Endpoints {
            identity_url: endpoint(ENV_IDENTITY_URL, defaults.identity_url),
            secure_token_url: endpoint(ENV_SECURE_TOKEN_URL, defaults.secure_token_url),
            firestore_url: endpoint(ENV_FIRESTORE_URL, defaults.firestore_url),
            storage_url: endpoint(ENV_STORAGE_URL, defaults.storage_url),
        },
    }
    .validated()
    .map(Some)
}

fn require_http_url(raw: &str, field: &str) -> Result<String> {
    normalize_endpoint_url(raw)
        .ok_or_else(|| Error::InvalidInput(format!("{field} must start with http:// or https://")))
}

fn default_identity_url() -> String {
    DEFAULT_IDENTITY_URL.to_string()
}

fn default_secure_token_url() -> String {
    DEFAULT_SECURE_TOKEN_URL.to_string()
}

fn default_firestore_url() -> String {
    DEFAULT_FIRESTORE_URL.to_string()
}

fn default_storage_url() -> String {
    DEFAULT_STORAGE_URL.to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<Option<BackendConfig>> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn parse_config_none_returns_none() {
        assert!(parse_from_map(&HashMap::new()).unwrap().is_none());
    }

    #[test]
    fn parse_config_reports_every_missing_value() {
        let mut map = HashMap::new();
        map.insert(ENV_API_KEY, "key");

        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::InvalidInput(message) => {
                assert!(message.contains(ENV_PROJECT_ID));
                assert!(message.contains(ENV_STORAGE_BUCKET));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_config_applies_endpoint_overrides() {
        let mut map = HashMap::new();
        map.insert(ENV_API_KEY, " key ");
        map.insert(ENV_PROJECT_ID, "travelsnap-21052");
        map.insert(ENV_STORAGE_BUCKET, "travelsnap-21052.appspot.com");
        map.insert(ENV_FIRESTORE_URL, "http://localhost:8080/");

        let config = parse_from_map(&map).unwrap().unwrap();
        assert_eq!(config.api_key, "key");
        assert_eq!(config.endpoints.firestore_url, "http://localhost:8080");
        assert_eq!(config.endpoints.identity_url, DEFAULT_IDENTITY_URL);
    }

    #[test]
    fn parse_config_rejects_invalid_picture_url() {
        let mut map = HashMap::new();
        map.insert(ENV_API_KEY, "key");
        map.insert(ENV_PROJECT_ID, "project");
        map.insert(ENV_STORAGE_BUCKET, "bucket");
        map.insert(ENV_DEFAULT_PROFILE_PICTURE_URL, "cdn.example.com/default.png");

        let err = parse_from_map(&map).unwrap_err();
        assert!(err.to_string().contains("default_profile_picture_url"));
    }

    #[test]
    fn parse_web_config_reads_console_snippet() {
        let payload = r#"
        {
          "apiKey": "AIza-test",
          "authDomain": "travelsnap-test.firebaseapp.com",
          "projectId": "travelsnap-test",
          "storageBucket": "travelsnap-test.appspot.com",
          "messagingSenderId": "1234",
          "appId": "1:1234:web:abcd",
          "measurementId": "G-TEST"
        }
        "#;

        let config = parse_firebase_web_config(payload).unwrap();
        assert_eq!(config.api_key, "AIza-test");
        assert_eq!(config.project_id, "travelsnap-test");
        assert_eq!(config.storage_bucket, "travelsnap-test.appspot.com");
        assert_eq!(config.endpoints, Endpoints::default());
    }

    #[test]
    fn parse_web_config_requires_project_id() {
        let payload = r#"{ "apiKey": "key", "storageBucket": "bucket" }"#;
        let err = parse_firebase_web_config(payload).unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }

    #[test]
    fn endpoints_all_trims_trailing_slash() {
        let endpoints = Endpoints::all("http://127.0.0.1:9000/");
        assert_eq!(endpoints.storage_url, "http://127.0.0.1:9000");
        assert_eq!(endpoints.identity_url, endpoints.firestore_url);
    }
}
