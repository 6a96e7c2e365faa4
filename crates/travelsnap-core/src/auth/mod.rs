//! Identity service abstraction, session model and local session persistence.

mod firebase;
mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::unix_timestamp_now;

pub use firebase::FirebaseAuthClient;
pub use memory::{MemoryIdentityProvider, MemorySessionStore};

/// Fixed key under which the session artifact is stored locally.
pub const SESSION_STORAGE_KEY: &str = "auth_token";

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Signed-in identity passed explicitly to every backend call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token (a JWT carrying an `exp` claim)
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    /// True when the identity service's own expiry (minus a small skew) has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }

    #[must_use]
    pub fn user_id(&self) -> crate::UserId {
        crate::UserId::new(self.user.id.clone())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Third-party credential obtained out of band (e.g. a Google ID token).
#[derive(Clone, PartialEq, Eq)]
pub struct IdpCredential {
    pub provider_id: String,
    pub id_token: String,
}

impl IdpCredential {
    #[must_use]
    pub fn google(id_token: impl Into<String>) -> Self {
        Self {
            provider_id: "google.com".to_string(),
            id_token: id_token.into(),
        }
    }
}

impl fmt::Debug for IdpCredential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("IdpCredential")
            .field("provider_id", &self.provider_id)
            .field("id_token", &"[REDACTED]")
            .finish()
    }
}

/// Result of a third-party sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpSignIn {
    pub session: AuthSession,
    /// Reported by the identity service; profile provisioning does not rely on it.
    pub is_new_user: bool,
    pub provider_access_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Client-local storage for the single session artifact.
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// External identity service operations.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an email/password account and set its display name.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<AuthSession>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> AuthResult<AuthSession>;

    async fn sign_in_with_idp(&self, credential: &IdpCredential) -> AuthResult<IdpSignIn>;

    /// Exchange the session's refresh token, keeping the user fields.
    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession>;

    async fn send_password_reset(&self, email: &str) -> AuthResult<()>;
}

pub(crate) fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}
