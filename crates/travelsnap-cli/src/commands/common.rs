use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use travelsnap_core::auth::SessionPersistence;
use travelsnap_core::config::BackendConfig;
use travelsnap_core::guard::{NavigationDecision, Notice, NoticeLevel, Route, RouteGuard};
use travelsnap_core::services::Backend;
use travelsnap_core::storage::S3Config;
use travelsnap_core::{AuthSession, Comment, GeoPoint, Post, UserProfile};

use crate::auth::KeyringSessionStore;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Services for the resolved profile plus the guard in front of protected views.
pub struct Context<S: SessionPersistence = KeyringSessionStore> {
    pub profile_name: String,
    pub backend: Backend<S>,
    guard: RouteGuard<S>,
}

/// Outcome of asking the guard for a protected view.
#[derive(Debug)]
pub enum Admission {
    Allowed(AuthSession),
    Redirected(Option<Notice>),
}

impl Context {
    pub fn open(global_profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(global_profile);
        let backend_config = resolve_backend_config(&profile_name, config.profile(&profile_name))?;

        let store = KeyringSessionStore::new(&profile_name);
        let backend = Backend::from_config(&backend_config, S3Config::from_env()?, store)?;
        Ok(Self::new(profile_name, backend))
    }
}

impl<S: SessionPersistence> Context<S> {
    pub fn new(profile_name: String, backend: Backend<S>) -> Self {
        let guard = RouteGuard::new(
            backend.auth.session_store().clone(),
            Arc::new(backend.auth.clone()),
        );
        Self {
            profile_name,
            backend,
            guard,
        }
    }

    /// Pass the route guard and return the live session for `route`.
    pub async fn enter(&self, route: Route) -> Result<AuthSession, CliError> {
        match self.admit(route).await? {
            Admission::Allowed(session) => Ok(session),
            Admission::Redirected(notice) => {
                if let Some(notice) = notice {
                    print_notice(&notice);
                }
                Err(CliError::NotSignedIn)
            }
        }
    }

    /// Renew an expired session, then let the guard judge what is stored.
    pub async fn admit(&self, route: Route) -> Result<Admission, CliError> {
        self.backend.auth.renew_session().await?;
        match self.guard.enter(route).await {
            NavigationDecision::Allow(_) => self
                .backend
                .auth
                .session_store()
                .load_session()
                .map_err(travelsnap_core::Error::from)?
                .map(Admission::Allowed)
                .ok_or(CliError::NotSignedIn),
            NavigationDecision::Redirect { notice, .. } => Ok(Admission::Redirected(notice)),
        }
    }
}

/// The profile's backend, falling back to `TRAVELSNAP_*` environment variables.
pub fn resolve_backend_config(
    profile_name: &str,
    profile: Option<&CliProfile>,
) -> Result<BackendConfig, CliError> {
    if let Some(config) = profile
        .map(CliProfile::backend_config)
        .transpose()
        .map_err(CliError::Config)?
        .flatten()
    {
        return Ok(config);
    }

    BackendConfig::from_env()?.ok_or_else(|| {
        CliError::Config(format!(
            "Profile '{profile_name}' is not configured. Run `travelsnap config init --web-config <file>` or set TRAVELSNAP_API_KEY, TRAVELSNAP_PROJECT_ID and TRAVELSNAP_STORAGE_BUCKET."
        ))
    })
}

pub fn print_notice(notice: &Notice) {
    let level = match notice.level {
        NoticeLevel::Warning => "warning",
    };
    eprintln!("{level}: {}", notice.message);
}

#[derive(Debug, Serialize)]
pub struct PostListItem {
    pub id: String,
    pub posted_by: String,
    pub username: String,
    pub description: String,
    pub image_url: String,
    pub lat: f64,
    pub lng: f64,
    pub likes_count: i64,
    pub created_at: String,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct CommentListItem {
    pub id: String,
    pub posted_by: String,
    pub username: String,
    pub text: String,
    pub created_at: String,
    pub relative_time: String,
}

pub fn post_to_list_item(post: &Post, now: DateTime<Utc>) -> PostListItem {
    PostListItem {
        id: post.id.to_string(),
        posted_by: post.author.posted_by.to_string(),
        username: post.author.username.clone(),
        description: post.description.clone(),
        image_url: post.image_url.clone(),
        lat: post.geolocation.lat,
        lng: post.geolocation.lng,
        likes_count: post.likes_count,
        created_at: post.created_at.to_rfc3339(),
        relative_time: format_relative_time(post.created_at, now),
    }
}

pub fn comment_to_list_item(comment: &Comment, now: DateTime<Utc>) -> CommentListItem {
    CommentListItem {
        id: comment.id.to_string(),
        posted_by: comment.author.posted_by.to_string(),
        username: comment.author.username.clone(),
        text: comment.text.clone(),
        created_at: comment.created_at.to_rfc3339(),
        relative_time: format_relative_time(comment.created_at, now),
    }
}

pub fn format_post_lines(posts: &[Post], now: DateTime<Utc>) -> Vec<String> {
    posts
        .iter()
        .map(|post| {
            format!(
                "{}  {:<16}  {:>4} likes  {:<8}  {}",
                post.id,
                preview(&post.author.username, 16),
                post.likes_count,
                format_relative_time(post.created_at, now),
                preview(&post.description, 40)
            )
        })
        .collect()
}

pub fn format_comment_lines(comments: &[Comment], now: DateTime<Utc>) -> Vec<String> {
    comments
        .iter()
        .map(|comment| {
            format!(
                "{}  {:<16}  {:<8}  {}",
                comment.id,
                preview(&comment.author.username, 16),
                format_relative_time(comment.created_at, now),
                preview(&comment.text, 60)
            )
        })
        .collect()
}

/// First line of `text`, whitespace collapsed, cut to `max_chars` with an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - at).num_milliseconds();
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_identifier(id: &str, what: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::InvalidInput(format!("{what} cannot be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Read an image file and guess its content type from the extension.
pub fn read_image(path: &Path) -> Result<(Vec<u8>, String), CliError> {
    let content_type = image_content_type(path)?;
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(CliError::InvalidInput(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok((bytes, content_type))
}

pub fn image_content_type(path: &Path) -> Result<String, CliError> {
    let guess = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    if guess.starts_with("image/") {
        Ok(guess)
    } else {
        Err(CliError::InvalidInput(format!(
            "{} does not look like an image ({guess})",
            path.display()
        )))
    }
}

/// The signed-in user's profile; every write that snapshots the author needs it.
pub async fn require_own_profile(
    context: &Context,
    session: &AuthSession,
) -> Result<UserProfile, CliError> {
    let user_id = session.user_id();
    context
        .backend
        .social
        .get_user_profile(session, &user_id)
        .await?
        .ok_or_else(|| CliError::NotFound(format!("profile for user {user_id}")))
}

/// Parse `"lat,lng"` into a validated point.
pub fn parse_location(raw: &str) -> Result<GeoPoint, CliError> {
    raw.parse::<GeoPoint>()
        .map_err(|error| CliError::InvalidInput(format!("Invalid location '{raw}': {error}")))
}
