//! Navigation-time session check for protected routes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::auth::SessionPersistence;
use crate::models::PostId;
use crate::services::SignOut;
use crate::util::unix_timestamp_now;

pub const SESSION_EXPIRED_MESSAGE: &str = "User session has expired - please sign in again";
const SESSION_EXPIRED_NOTICE_DURATION: Duration = Duration::from_secs(3);

/// Client views. Everything except `Authentication` requires a live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Authentication,
    Home,
    Profile,
    Composer,
    Map,
    Post(PostId),
}

impl Route {
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        !matches!(self, Self::Authentication)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => f.write_str("/auth"),
            Self::Home => f.write_str("/"),
            Self::Profile => f.write_str("/profile"),
            Self::Composer => f.write_str("/compose"),
            Self::Map => f.write_str("/map"),
            Self::Post(id) => write!(f, "/post/{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Warning,
}

/// Transient user-facing message (a toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub level: NoticeLevel,
    pub duration: Duration,
}

impl Notice {
    #[must_use]
    pub fn session_expired() -> Self {
        Self {
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            level: NoticeLevel::Warning,
            duration: SESSION_EXPIRED_NOTICE_DURATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow(Route),
    Redirect {
        to: Route,
        notice: Option<Notice>,
    },
}

impl NavigationDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// State of the locally stored token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Missing,
    /// Unreadable, or without an `exp` claim
    Malformed,
    Expired { exp: i64 },
    Valid { exp: i64 },
}

impl TokenStatus {
    /// Classify a bearer token; `exp` equal to `now` still counts as valid.
    #[must_use]
    pub fn of(token: &str, now: i64) -> Self {
        match decode_token_expiry(token) {
            None => Self::Malformed,
            Some(exp) if exp < now => Self::Expired { exp },
            Some(exp) => Self::Valid { exp },
        }
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT without verifying its signature.
///
/// The identity service verifies tokens on every request; this only decides
/// whether the client should bother sending it.
#[must_use]
pub fn decode_token_expiry(token: &str) -> Option<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<ExpiryClaim>(token.trim(), &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.exp)
}

/// Two-state gate (allow or redirect) evaluated on each navigation.
#[derive(Clone)]
pub struct RouteGuard<S: SessionPersistence> {
    store: S,
    sign_out: Arc<dyn SignOut>,
}

impl<S: SessionPersistence> RouteGuard<S> {
    pub fn new(store: S, sign_out: Arc<dyn SignOut>) -> Self {
        Self { store, sign_out }
    }

    pub async fn enter(&self, route: Route) -> NavigationDecision {
        self.enter_at(route, unix_timestamp_now()).await
    }

    /// Evaluate navigation to `route` as of the Unix time `now`.
    pub async fn enter_at(&self, route: Route, now: i64) -> NavigationDecision {
        if !route.is_protected() {
            return NavigationDecision::Allow(route);
        }

        let status = match self.store.load_session() {
            Ok(Some(session)) => TokenStatus::of(&session.id_token, now),
            Ok(None) => TokenStatus::Missing,
            Err(error) => {
                tracing::warn!("Stored session is unreadable: {error}");
                TokenStatus::Malformed
            }
        };

        match status {
            TokenStatus::Valid { .. } => NavigationDecision::Allow(route),
            TokenStatus::Missing => {
                tracing::debug!("No session for {route}, redirecting");
                NavigationDecision::Redirect {
                    to: Route::Authentication,
                    notice: None,
                }
            }
            TokenStatus::Expired { .. } | TokenStatus::Malformed => {
                tracing::warn!("Session expired on entering {route} ({status:?})");
                self.expire().await
            }
        }
    }

    async fn expire(&self) -> NavigationDecision {
        if let Err(error) = self.store.clear_session() {
            tracing::warn!("Failed to evict expired session: {error}");
        }
        let notice = Notice::session_expired();
        if let Err(error) = self.sign_out.sign_out().await {
            tracing::error!("Sign-out after session expiry failed: {error}");
        }
        NavigationDecision::Redirect {
            to: Route::Authentication,
            notice: Some(notice),
        }
    }
}
