//! Firebase Identity Toolkit / Secure Token REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{
    validate_credentials, AuthError, AuthResult, AuthSession, AuthUser, IdentityProvider,
    IdpCredential, IdpSignIn,
};
use crate::config::{normalize_endpoint_url, BackendConfig};
use crate::util::unix_timestamp_now;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const IDP_REQUEST_URI: &str = "http://localhost";

#[derive(Clone)]
pub struct FirebaseAuthClient {
    api_key: String,
    identity_url: String,
    secure_token_url: String,
    client: Client,
}

impl FirebaseAuthClient {
    pub fn new(
        api_key: impl Into<String>,
        identity_url: impl AsRef<str>,
        secure_token_url: impl AsRef<str>,
    ) -> AuthResult<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Firebase API key must not be empty",
            ));
        }
        let identity_url = normalize_endpoint_url(identity_url.as_ref()).ok_or(
            AuthError::InvalidConfiguration("Identity URL must include http:// or https://"),
        )?;
        let secure_token_url = normalize_endpoint_url(secure_token_url.as_ref()).ok_or(
            AuthError::InvalidConfiguration("Secure token URL must include http:// or https://"),
        )?;

        Ok(Self {
            api_key,
            identity_url,
            secure_token_url,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()?,
        })
    }

    pub fn from_config(config: &BackendConfig) -> AuthResult<Self> {
        Self::new(
            config.api_key.clone(),
            &config.endpoints.identity_url,
            &config.endpoints.secure_token_url,
        )
    }

    fn accounts_request(&self, method: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/v1/accounts:{method}", self.identity_url))
            .query(&[("key", self.api_key.as_str())])
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> AuthResult<T> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<T>().await?)
    }

    async fn update_display_name(
        &self,
        session: AuthSession,
        display_name: &str,
    ) -> AuthResult<AuthSession> {
        let payload = serde_json::json!({
            "idToken": session.id_token,
            "displayName": display_name,
            "returnSecureToken": true,
        });
        let response: AccountResponse = self
            .send(self.accounts_request("update").json(&payload))
            .await?;
        Ok(response.merge_into(session))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let response: AccountResponse = self
            .send(self.accounts_request("signUp").json(&payload))
            .await?;
        let session = response.into_session()?;

        let display_name = display_name.trim();
        if display_name.is_empty() {
            Ok(session)
        } else {
            self.update_display_name(session, display_name).await
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let response: AccountResponse = self
            .send(self.accounts_request("signInWithPassword").json(&payload))
            .await?;
        response.into_session()
    }

    async fn sign_in_with_idp(&self, credential: &IdpCredential) -> AuthResult<IdpSignIn> {
        if credential.id_token.trim().is_empty() {
            return Err(AuthError::Api("Provider token is required".to_string()));
        }

        let post_body = format!(
            "id_token={}&providerId={}",
            urlencoding::encode(credential.id_token.trim()),
            urlencoding::encode(&credential.provider_id)
        );
        let payload = serde_json::json!({
            "postBody": post_body,
            "requestUri": IDP_REQUEST_URI,
            "returnIdpCredential": true,
            "returnSecureToken": true,
        });
        let response: AccountResponse = self
            .send(self.accounts_request("signInWithIdp").json(&payload))
            .await?;
        let is_new_user = response.is_new_user.unwrap_or(false);
        let provider_access_token = response.oauth_access_token.clone();

        Ok(IdpSignIn {
            session: response.into_session()?,
            is_new_user,
            provider_access_token,
        })
    }

    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        if session.refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let request = self
            .client
            .post(format!("{}/v1/token", self.secure_token_url))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ]);
        let response: RefreshResponse = self.send(request).await?;
        if response.user_id != session.user.id {
            return Err(AuthError::Api(
                "Refresh response belongs to a different user".to_string(),
            ));
        }

        Ok(AuthSession {
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at: expires_at_from(&response.expires_in)?,
            user: session.user.clone(),
        })
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        if email.trim().is_empty() {
            return Err(AuthError::Api("Email is required".to_string()));
        }

        let payload = serde_json::json!({
            "requestType": "PASSWORD_RESET",
            "email": email.trim(),
        });
        let _: serde_json::Value = self
            .send(self.accounts_request("sendOobCode").json(&payload))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    is_new_user: Option<bool>,
    oauth_access_token: Option<String>,
}

impl AccountResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        match (self.local_id, self.id_token, self.refresh_token, self.expires_in) {
            (Some(id), Some(id_token), Some(refresh_token), Some(expires_in)) => {
                Ok(AuthSession {
                    id_token,
                    refresh_token,
                    expires_at: expires_at_from(&expires_in)?,
                    user: AuthUser {
                        id,
                        email: self.email,
                        display_name: self.display_name.filter(|name| !name.is_empty()),
                        photo_url: self.photo_url.filter(|url| !url.is_empty()),
                    },
                })
            }
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }

    /// `accounts:update` may or may not rotate tokens; keep the old ones when absent.
    fn merge_into(self, mut session: AuthSession) -> AuthSession {
        if let (Some(id_token), Some(refresh_token), Some(expires_in)) =
            (self.id_token, self.refresh_token, self.expires_in)
        {
            if let Ok(expires_at) = expires_at_from(&expires_in) {
                session.id_token = id_token;
                session.refresh_token = refresh_token;
                session.expires_at = expires_at;
            }
        }
        if let Some(email) = self.email {
            session.user.email = Some(email);
        }
        if let Some(display_name) = self.display_name.filter(|name| !name.is_empty()) {
            session.user.display_name = Some(display_name);
        }
        if let Some(photo_url) = self.photo_url.filter(|url| !url.is_empty()) {
            session.user.photo_url = Some(photo_url);
        }
        session
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorResponse {
    error: Option<FirebaseErrorBody>,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorBody {
    message: Option<String>,
}

fn expires_at_from(expires_in: &str) -> AuthResult<i64> {
    let seconds = expires_in
        .trim()
        .parse::<i64>()
        .map_err(|_| AuthError::Api(format!("Invalid expiresIn value: {expires_in}")))?;
    Ok(unix_timestamp_now().saturating_add(seconds))
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<FirebaseErrorResponse>(body) {
        if let Some(message) = payload.error.and_then(|error| error.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn client_for(server: &MockServer) -> FirebaseAuthClient {
        FirebaseAuthClient::new("test-key", server.uri(), server.uri()).unwrap()
    }

    #[test]
    fn new_rejects_empty_api_key() {
        let result = FirebaseAuthClient::new(" ", "https://a.example", "https://b.example");
        assert!(matches!(
            result,
            Err(AuthError::InvalidConfiguration(message)) if message.contains("API key")
        ));
    }

    #[test]
    fn parse_api_error_prefers_service_message() {
        let body = r#"{"error":{"code":400,"message":"EMAIL_EXISTS","errors":[]}}"#;
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, body),
            "EMAIL_EXISTS (400)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[tokio::test]
    async fn sign_up_sets_display_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signUp"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(serde_json::json!({"email": "a@x.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "localId": "uid-1",
                "email": "a@x.com",
                "idToken": "token-1",
                "refreshToken": "refresh-1",
                "expiresIn": "3600"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:update"))
            .and(body_partial_json(
                serde_json::json!({"idToken": "token-1", "displayName": "alice"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "localId": "uid-1",
                "email": "a@x.com",
                "displayName": "alice",
                "idToken": "token-2",
                "refreshToken": "refresh-2",
                "expiresIn": "3600"
            })))
            .mount(&server)
            .await;

        let session = client_for(&server)
            .await
            .sign_up("a@x.com", "pw123456", "alice")
            .await
            .unwrap();
        assert_eq!(session.user.id, "uid-1");
        assert_eq!(session.user.display_name.as_deref(), Some("alice"));
        assert_eq!(session.id_token, "token-2");
        assert!(session.expires_at > unix_timestamp_now());
    }

    #[tokio::test]
    async fn sign_in_surfaces_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithPassword"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": 400, "message": "INVALID_LOGIN_CREDENTIALS" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .sign_in_with_password("a@x.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Auth API error: INVALID_LOGIN_CREDENTIALS (400)");
    }

    #[tokio::test]
    async fn idp_sign_in_reports_new_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithIdp"))
            .and(body_partial_json(serde_json::json!({
                "postBody": "id_token=google-token&providerId=google.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "localId": "uid-9",
                "email": "g@x.com",
                "displayName": "Gina",
                "photoUrl": "https://photo",
                "idToken": "token",
                "refreshToken": "refresh",
                "expiresIn": "3600",
                "isNewUser": true,
                "oauthAccessToken": "oauth"
            })))
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .await
            .sign_in_with_idp(&IdpCredential::google("google-token"))
            .await
            .unwrap();
        assert!(outcome.is_new_user);
        assert_eq!(outcome.provider_access_token.as_deref(), Some("oauth"));
        assert_eq!(outcome.session.user.photo_url.as_deref(), Some("https://photo"));
    }

    #[tokio::test]
    async fn refresh_keeps_user_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id_token": "fresh",
                "refresh_token": "fresh-refresh",
                "expires_in": "3600",
                "user_id": "uid-1"
            })))
            .mount(&server)
            .await;

        let stale = AuthSession {
            id_token: "old".to_string(),
            refresh_token: "old-refresh".to_string(),
            expires_at: 0,
            user: AuthUser {
                id: "uid-1".to_string(),
                email: Some("a@x.com".to_string()),
                display_name: Some("alice".to_string()),
                photo_url: None,
            },
        };
        let refreshed = client_for(&server)
            .await
            .refresh_session(&stale)
            .await
            .unwrap();
        assert_eq!(refreshed.id_token, "fresh");
        assert_eq!(refreshed.user, stale.user);
    }

    #[tokio::test]
    async fn password_reset_posts_oob_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:sendOobCode"))
            .and(body_partial_json(serde_json::json!({
                "requestType": "PASSWORD_RESET",
                "email": "a@x.com"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"email": "a@x.com"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .send_password_reset(" a@x.com ")
            .await
            .unwrap();
    }
}
