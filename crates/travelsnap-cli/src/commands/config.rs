use std::env;
use std::path::Path;

use travelsnap_core::config::{parse_firebase_web_config, BackendConfig};
use travelsnap_core::util::is_http_url;

use crate::cli::ConfigCommands;
use crate::config_profiles::{default_config_path, normalize_text_option, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            web_config,
            api_key,
            project_id,
            storage_bucket,
            default_profile_picture,
            no_activate,
        } => {
            let web_config = web_config
                .as_deref()
                .map(load_web_config)
                .transpose()?;
            run_config_init(
                global_profile,
                ProfileInput {
                    api_key,
                    project_id,
                    storage_bucket,
                    default_profile_picture,
                },
                web_config,
                no_activate,
            )
        }
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

/// Values given on the command line for `config init`.
#[derive(Debug, Default)]
pub struct ProfileInput {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub default_profile_picture: Option<String>,
}

fn load_web_config(path: &Path) -> Result<BackendConfig, CliError> {
    let raw = std::fs::read_to_string(path)?;
    let config = parse_firebase_web_config(&raw)?;
    println!("Loaded web config from {}", path.display());
    Ok(config)
}

/// Flags win over the web config, which wins over `TRAVELSNAP_*` variables,
/// which win over what the profile already holds.
pub fn run_config_init(
    profile_name: Option<&str>,
    input: ProfileInput,
    web_config: Option<BackendConfig>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let merged_api_key = normalize_text_option(input.api_key)
        .or_else(|| web_config.as_ref().map(|web| web.api_key.clone()))
        .or_else(|| normalize_text_option(env::var("TRAVELSNAP_API_KEY").ok()));
    let merged_project_id = normalize_text_option(input.project_id)
        .or_else(|| web_config.as_ref().map(|web| web.project_id.clone()))
        .or_else(|| normalize_text_option(env::var("TRAVELSNAP_PROJECT_ID").ok()));
    let merged_storage_bucket = normalize_text_option(input.storage_bucket)
        .or_else(|| web_config.as_ref().map(|web| web.storage_bucket.clone()))
        .or_else(|| normalize_text_option(env::var("TRAVELSNAP_STORAGE_BUCKET").ok()));
    let merged_default_picture = normalize_text_option(input.default_profile_picture)
        .or_else(|| {
            normalize_text_option(env::var("TRAVELSNAP_DEFAULT_PROFILE_PICTURE_URL").ok())
        });

    if let Some(url) = merged_default_picture.as_deref() {
        if !is_http_url(url) {
            return Err(CliError::Config(
                "default_profile_picture must include http:// or https://".to_string(),
            ));
        }
    }

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(value) = merged_api_key {
        profile.api_key = Some(value);
    }
    if let Some(value) = merged_project_id {
        profile.project_id = Some(value);
    }
    if let Some(value) = merged_storage_bucket {
        profile.storage_bucket = Some(value);
    }
    if let Some(value) = merged_default_picture {
        profile.default_profile_picture_url = Some(value);
    }
    let missing_fields = profile.missing_fields();

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    if missing_fields.is_empty() {
        println!(
            "Profile '{profile_name}' is ready. Run `travelsnap auth register` or `travelsnap auth login`."
        );
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

pub fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let path = default_config_path().map_err(CliError::Config)?;

    println!("Config file: {}", path.display());
    println!("Profile: {profile_name}");
    let Some(profile) = config.profile(&profile_name) else {
        println!("  (not configured; `TRAVELSNAP_*` environment variables apply)");
        return Ok(());
    };

    println!(
        "  api_key: {}",
        profile.api_key.as_deref().map_or("-".to_string(), redact)
    );
    println!(
        "  project_id: {}",
        profile.project_id.as_deref().unwrap_or("-")
    );
    println!(
        "  storage_bucket: {}",
        profile.storage_bucket.as_deref().unwrap_or("-")
    );
    println!(
        "  default_profile_picture_url: {}",
        profile.default_profile_picture_url.as_deref().unwrap_or("-")
    );
    if let Some(endpoints) = &profile.endpoints {
        println!("  identity_url: {}", endpoints.identity_url);
        println!("  firestore_url: {}", endpoints.firestore_url);
        println!("  storage_url: {}", endpoints.storage_url);
    }

    let missing = profile.missing_fields();
    if !missing.is_empty() {
        println!("  missing: {}", missing.join(", "));
    }
    Ok(())
}

/// Keep the first four characters of a key.
pub fn redact(value: &str) -> String {
    let visible = value.chars().take(4).collect::<String>();
    format!("{visible}...")
}
