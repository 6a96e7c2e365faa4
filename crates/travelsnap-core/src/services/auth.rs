//! Account lifecycle: sign-up with profile provisioning, sign-in, sign-out
//! and session restore.

use std::sync::Arc;

use async_trait::async_trait;

use super::{MediaService, SocialService};
use crate::auth::{
    validate_credentials, AuthSession, IdentityProvider, IdpCredential, SessionPersistence,
};
use crate::models::UserProfile;
use crate::util::normalize_text_option;
use crate::{Error, Result};

/// Ends the local session; the route guard calls this on expiry.
#[async_trait]
pub trait SignOut: Send + Sync {
    async fn sign_out(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct AuthService<S: SessionPersistence> {
    identity: Arc<dyn IdentityProvider>,
    store: S,
    social: SocialService,
    media: MediaService,
}

impl<S: SessionPersistence> AuthService<S> {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: S,
        social: SocialService,
        media: MediaService,
    ) -> Self {
        Self {
            identity,
            store,
            social,
            media,
        }
    }

    pub const fn session_store(&self) -> &S {
        &self.store
    }

    /// Create an account and its profile document, then persist the session.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthSession> {
        validate_credentials(email, password)?;
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(Error::InvalidInput("Display name is required".to_string()));
        }

        let session = self
            .identity
            .sign_up(email.trim(), password, display_name)
            .await
            .inspect_err(|error| tracing::error!("Sign-up failed: {error}"))?;
        self.store.save_session(&session)?;

        let profile = self.profile_for(&session, display_name);
        self.social.create_user_profile(&session, &profile).await?;
        tracing::info!("Registered user {}", session.user.id);
        Ok(session)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        validate_credentials(email, password)?;
        let session = self
            .identity
            .sign_in_with_password(email.trim(), password)
            .await
            .inspect_err(|error| tracing::error!("Sign-in failed: {error}"))?;
        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Sign in with a third-party credential, provisioning a profile on first use.
    pub async fn social_sign_in(&self, credential: &IdpCredential) -> Result<AuthSession> {
        let signed_in = self
            .identity
            .sign_in_with_idp(credential)
            .await
            .inspect_err(|error| {
                tracing::error!("Sign-in with {} failed: {error}", credential.provider_id);
            })?;
        let session = signed_in.session;
        self.store.save_session(&session)?;

        let username = session
            .user
            .display_name
            .clone()
            .and_then(|name| normalize_text_option(Some(name)))
            .or_else(|| session.user.email.clone())
            .unwrap_or_else(|| session.user.id.clone());
        let profile = self.profile_for(&session, &username);
        self.social.provision_user_profile(&session, &profile).await?;
        Ok(session)
    }

    /// Drop the persisted session.
    pub fn logout(&self) -> Result<()> {
        self.store
            .clear_session()
            .inspect_err(|error| tracing::error!("Failed to clear session: {error}"))?;
        Ok(())
    }

    /// The persisted session, refreshed once when its expiry has passed.
    pub async fn current_session(&self) -> Result<Option<AuthSession>> {
        let Some(stored) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored.is_expired() {
            return Ok(Some(stored));
        }

        match self.identity.refresh_session(&stored).await {
            Ok(refreshed) => {
                self.store.save_session(&refreshed)?;
                Ok(Some(refreshed))
            }
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    /// Refresh the persisted session in place when it has expired.
    ///
    /// Unlike [`current_session`](Self::current_session) nothing is cleared:
    /// an unreadable session or a rejected refresh is left for the route guard
    /// to evict.
    pub async fn renew_session(&self) -> Result<()> {
        let stored = match self.store.load_session() {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(()),
            Err(error) => {
                tracing::warn!("Persisted session is unreadable: {error}");
                return Ok(());
            }
        };
        if !stored.is_expired() {
            return Ok(());
        }

        match self.identity.refresh_session(&stored).await {
            Ok(refreshed) => self.store.save_session(&refreshed)?,
            Err(error) => tracing::warn!("Failed to refresh persisted session: {error}"),
        }
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::InvalidInput("Email is required".to_string()));
        }
        self.identity
            .send_password_reset(email)
            .await
            .inspect_err(|error| tracing::error!("Password reset failed: {error}"))?;
        Ok(())
    }

    fn profile_for(&self, session: &AuthSession, username: &str) -> UserProfile {
        let picture = session
            .user
            .photo_url
            .clone()
            .and_then(|url| normalize_text_option(Some(url)))
            .or_else(|| self.media.default_profile_picture_url())
            .unwrap_or_default();
        UserProfile::new(
            session.user_id(),
            username,
            session.user.email.clone(),
            picture,
        )
    }
}

#[async_trait]
impl<S: SessionPersistence> SignOut for AuthService<S> {
    async fn sign_out(&self) -> Result<()> {
        self.logout()
    }
}
