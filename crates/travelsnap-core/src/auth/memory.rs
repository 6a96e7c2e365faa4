//! In-process identity service and session store for tests and offline use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

use super::{
    validate_credentials, AuthError, AuthResult, AuthSession, AuthUser, IdentityProvider,
    IdpCredential, IdpSignIn, SessionPersistence, SESSION_STORAGE_KEY,
};
use crate::util::unix_timestamp_now;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 3600;
const SIGNING_SECRET: &[u8] = b"travelsnap-memory-identity";

/// Session store holding serialized sessions in a shared map.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value under the session key, bypassing serialization.
    pub fn put_raw(&self, raw: impl Into<String>) -> AuthResult<()> {
        self.lock()?
            .insert(SESSION_STORAGE_KEY.to_string(), raw.into());
        Ok(())
    }

    pub fn raw(&self) -> AuthResult<Option<String>> {
        Ok(self.lock()?.get(SESSION_STORAGE_KEY).cloned())
    }

    fn lock(&self) -> AuthResult<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        match self.lock()?.get(SESSION_STORAGE_KEY) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.put_raw(raw)
    }

    fn clear_session(&self) -> AuthResult<()> {
        self.lock()?.remove(SESSION_STORAGE_KEY);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: Option<String>,
    password: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Default)]
struct IdentityState {
    accounts: Vec<Account>,
    idp_subjects: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    password_resets: Vec<String>,
}

impl IdentityState {
    fn find_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| {
            account
                .email
                .as_deref()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
        })
    }

    fn find_by_uid(&self, uid: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.uid == uid)
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

/// Identity service kept in memory, issuing HS256 JWTs with a real `exp` claim.
#[derive(Debug, Clone)]
pub struct MemoryIdentityProvider {
    state: Arc<Mutex<IdentityState>>,
    token_ttl_seconds: i64,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }
}

impl MemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue tokens that expire `seconds` from now (negative values yield already-expired tokens).
    #[must_use]
    pub fn with_token_ttl(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    /// Emails for which a password reset was requested, oldest first.
    pub fn password_reset_requests(&self) -> AuthResult<Vec<String>> {
        Ok(self.lock()?.password_resets.clone())
    }

    fn lock(&self) -> AuthResult<MutexGuard<'_, IdentityState>> {
        self.state
            .lock()
            .map_err(|error| AuthError::Api(error.to_string()))
    }

    fn issue_session(&self, state: &mut IdentityState, account: &Account) -> AuthResult<AuthSession> {
        let now = unix_timestamp_now();
        let expires_at = now.saturating_add(self.token_ttl_seconds);
        let claims = Claims {
            sub: &account.uid,
            iat: now,
            exp: expires_at,
            email: account.email.as_deref(),
        };
        let id_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SIGNING_SECRET),
        )
        .map_err(|error| AuthError::Api(format!("Failed to sign token: {error}")))?;

        let refresh_token = Uuid::now_v7().to_string();
        state
            .refresh_tokens
            .insert(refresh_token.clone(), account.uid.clone());

        Ok(AuthSession {
            id_token,
            refresh_token,
            expires_at,
            user: AuthUser {
                id: account.uid.clone(),
                email: account.email.clone(),
                display_name: account.display_name.clone(),
                photo_url: None,
            },
        })
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let mut state = self.lock()?;
        if state.find_by_email(email.trim()).is_some() {
            return Err(AuthError::Api("EMAIL_EXISTS (400)".to_string()));
        }

        let account = Account {
            uid: Uuid::now_v7().simple().to_string(),
            email: Some(email.trim().to_string()),
            password: Some(password.to_string()),
            display_name: Some(display_name.trim().to_string()).filter(|name| !name.is_empty()),
        };
        state.accounts.push(account.clone());
        self.issue_session(&mut state, &account)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let mut state = self.lock()?;
        let account = state
            .find_by_email(email.trim())
            .filter(|account| account.password.as_deref() == Some(password))
            .cloned()
            .ok_or_else(|| AuthError::Api("INVALID_LOGIN_CREDENTIALS (400)".to_string()))?;
        self.issue_session(&mut state, &account)
    }

    async fn sign_in_with_idp(&self, credential: &IdpCredential) -> AuthResult<IdpSignIn> {
        let subject = credential.id_token.trim();
        if subject.is_empty() {
            return Err(AuthError::Api("Provider token is required".to_string()));
        }
        let key = format!("{}:{subject}", credential.provider_id);

        let mut state = self.lock()?;
        let existing = state
            .idp_subjects
            .get(&key)
            .and_then(|uid| state.find_by_uid(uid))
            .cloned();
        let (account, is_new_user) = if let Some(account) = existing {
            (account, false)
        } else {
            let account = Account {
                uid: Uuid::now_v7().simple().to_string(),
                email: None,
                password: None,
                display_name: Some(subject.to_string()),
            };
            state.accounts.push(account.clone());
            state.idp_subjects.insert(key, account.uid.clone());
            (account, true)
        };

        Ok(IdpSignIn {
            session: self.issue_session(&mut state, &account)?,
            is_new_user,
            provider_access_token: None,
        })
    }

    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        let mut state = self.lock()?;
        let uid = state
            .refresh_tokens
            .remove(&session.refresh_token)
            .filter(|uid| uid == &session.user.id)
            .ok_or_else(|| AuthError::Api("INVALID_REFRESH_TOKEN (400)".to_string()))?;
        let account = state
            .find_by_uid(&uid)
            .cloned()
            .ok_or_else(|| AuthError::Api("USER_NOT_FOUND (400)".to_string()))?;

        let mut refreshed = self.issue_session(&mut state, &account)?;
        refreshed.user = session.user.clone();
        Ok(refreshed)
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        let mut state = self.lock()?;
        if state.find_by_email(email.trim()).is_none() {
            return Err(AuthError::Api("EMAIL_NOT_FOUND (400)".to_string()));
        }
        state.password_resets.push(email.trim().to_string());
        Ok(())
    }
}
