//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use travelsnap_core::config::{BackendConfig, Endpoints};

const CONFIG_FILE_NAME: &str = "cli-config.json";
const PROFILE_ENV: &str = "TRAVELSNAP_PROFILE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

/// Backend project a profile talks to. Sessions live in the OS keychain, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub storage_bucket: Option<String>,
    #[serde(default)]
    pub default_profile_picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join("travelsnap").join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    travelsnap_core::util::normalize_text_option(value)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    normalize_text_option(value.map(ToOwned::to_owned))
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// `--profile`, then `TRAVELSNAP_PROFILE`, then the active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with_env(
            explicit,
            std::env::var(PROFILE_ENV).ok().as_deref(),
        )
    }

    fn resolve_profile_name_with_env(&self, explicit: Option<&str>, env: Option<&str>) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(env))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// Names of the required fields this profile still lacks.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push("api_key");
        }
        if self.project_id.is_none() {
            missing.push("project_id");
        }
        if self.storage_bucket.is_none() {
            missing.push("storage_bucket");
        }
        missing
    }

    /// The validated backend configuration, or `None` when nothing is set.
    pub fn backend_config(&self) -> Result<Option<BackendConfig>, String> {
        let mut normalized = self.clone();
        normalized.normalize();
        if normalized.missing_fields().len() == 3 {
            return Ok(None);
        }

        BackendConfig {
            api_key: normalized.api_key.unwrap_or_default(),
            project_id: normalized.project_id.unwrap_or_default(),
            storage_bucket: normalized.storage_bucket.unwrap_or_default(),
            default_profile_picture_url: normalized.default_profile_picture_url,
            endpoints: normalized.endpoints.unwrap_or_default(),
        }
        .validated()
        .map(Some)
        .map_err(|error| error.to_string())
    }

    fn normalize(&mut self) {
        self.api_key = normalize_text_option(self.api_key.clone());
        self.project_id = normalize_text_option(self.project_id.clone());
        self.storage_bucket = normalize_text_option(self.storage_bucket.clone());
        self.default_profile_picture_url =
            normalize_text_option(self.default_profile_picture_url.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let path = std::env::temp_dir().join(format!(
            "travelsnap-cli-config-test-{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some("default".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                api_key: Some(" web-key ".to_string()),
                project_id: Some("travelsnap-demo".to_string()),
                storage_bucket: Some("travelsnap-demo.appspot.com ".to_string()),
                default_profile_picture_url: None,
                endpoints: None,
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        let profile = loaded.profiles.get("default").unwrap();
        assert_eq!(profile.api_key.as_deref(), Some("web-key"));
        assert_eq!(
            profile.storage_bucket.as_deref(),
            Some("travelsnap-demo.appspot.com")
        );

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_env_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(
            config.resolve_profile_name_with_env(Some("mobile"), Some("env")),
            "mobile"
        );
        assert_eq!(config.resolve_profile_name_with_env(None, Some("env")), "env");
        assert_eq!(config.resolve_profile_name_with_env(None, Some(" ")), "work");
        assert_eq!(
            CliProfilesConfig::default().resolve_profile_name_with_env(None, None),
            "default"
        );
    }

    #[test]
    fn backend_config_reports_partial_profiles() {
        assert_eq!(CliProfile::default().backend_config(), Ok(None));

        let partial = CliProfile {
            api_key: Some("key".to_string()),
            ..CliProfile::default()
        };
        let err = partial.backend_config().unwrap_err();
        assert!(err.contains("project_id"));
        assert!(err.contains("storage_bucket"));
    }

    #[test]
    fn backend_config_uses_default_endpoints() {
        let profile = CliProfile {
            api_key: Some("key".to_string()),
            project_id: Some("demo".to_string()),
            storage_bucket: Some("demo.appspot.com".to_string()),
            default_profile_picture_url: None,
            endpoints: None,
        };
        let config = profile.backend_config().unwrap().unwrap();
        assert_eq!(config.endpoints, Endpoints::default());
    }
}
