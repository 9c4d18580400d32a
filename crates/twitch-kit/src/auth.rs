//! OAuth token management for Twitch authentication.
//!
//! Handles authorization URL generation, code exchange, client-credentials
//! app tokens, token validation and refresh.

use chrono::Utc;
use serde::Deserialize;
use url::Url;

use crate::config::{DEFAULT_AUTH_BASE_URL, TwitchConfig};
use crate::{Token, TwitchError};

/// Refresh tokens that expire within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 30 * 60;

/// Twitch OAuth token response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: Option<Vec<String>>,
}

/// Twitch OAuth error response.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Result of GET /oauth2/validate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    pub client_id: String,
    /// Absent for app access tokens.
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_in: i64,
}

/// Manages Twitch OAuth authentication.
///
/// Tokens are returned to the caller, who is responsible for persisting them.
pub struct TwitchAuth {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    base_url: String,
    http: reqwest::Client,
}

impl TwitchAuth {
    /// Create a new auth manager against the public id.twitch.tv endpoint.
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            base_url: DEFAULT_AUTH_BASE_URL.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Create an auth manager from config. The redirect URI is only needed
    /// for the authorization code flow.
    pub fn from_config(config: &TwitchConfig, redirect_uri: String) -> Self {
        Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            redirect_uri,
        )
        .with_base_url(&config.auth_base_url)
    }

    /// Override the OAuth endpoint (e.g. a mock server).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Generate the OAuth authorization URL for the given scopes.
    pub fn get_auth_url(&self, scopes: &[&str]) -> Result<String, TwitchError> {
        let scope_str = scopes.join(" ");
        let mut url = Url::parse(&format!("{}/authorize", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &scope_str)
            .append_pair("force_verify", "true");
        Ok(url.to_string())
    }

    /// Exchange an authorization code for access and refresh tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<Token, TwitchError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        self.request_token(&params).await
    }

    /// Obtain an app access token with the client-credentials grant.
    ///
    /// App tokens carry no refresh token; request a new one on expiry.
    pub async fn app_access_token(&self) -> Result<Token, TwitchError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];
        self.request_token(&params).await
    }

    /// Refresh an expired token using the refresh token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Token, TwitchError> {
        tracing::info!("Refreshing Twitch OAuth token");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.request_token(&params).await
    }

    /// Check a token with Twitch. A 401 means the token is no longer valid.
    pub async fn validate(&self, access_token: &str) -> Result<TokenInfo, TwitchError> {
        let resp = self
            .http
            .get(format!("{}/validate", self.base_url))
            .header("Authorization", format!("OAuth {access_token}"))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TwitchError::AuthRequired);
        }
        if !status.is_success() {
            return Err(TwitchError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Get a valid token, auto-refreshing if it expires within 30 minutes.
    ///
    /// Returns `Ok(None)` if refresh is not needed (token is still valid).
    /// Returns `Ok(Some(token))` with the refreshed token if a refresh was performed.
    /// The caller should persist the new token when `Some` is returned.
    pub async fn get_or_refresh_token(
        &self,
        current: &Token,
    ) -> Result<Option<Token>, TwitchError> {
        let now = Utc::now().timestamp();

        if !needs_refresh(current, now) {
            return Ok(None);
        }

        if current.refresh_token.is_empty() {
            return Err(TwitchError::AuthRequired);
        }

        tracing::info!(
            expires_in_secs = current.expires_at - now,
            "Token expiring soon, refreshing"
        );

        let new_token = self.refresh_token(&current.refresh_token).await?;
        Ok(Some(new_token))
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<Token, TwitchError> {
        let resp = self
            .http
            .post(format!("{}/token", self.base_url))
            .form(params)
            .send()
            .await?;

        parse_token_response(resp).await
    }
}

fn needs_refresh(token: &Token, now: i64) -> bool {
    now >= token.expires_at - REFRESH_MARGIN_SECS
}

/// Parse the token endpoint response into a `Token`.
async fn parse_token_response(resp: reqwest::Response) -> Result<Token, TwitchError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        let err: ErrorResponse = serde_json::from_str(&body).unwrap_or(ErrorResponse {
            error: Some(status.to_string()),
            message: None,
            error_description: Some(body.clone()),
        });
        return Err(TwitchError::TokenRefreshFailed(format!(
            "{}: {}",
            err.error.unwrap_or_default(),
            err.message.or(err.error_description).unwrap_or_default()
        )));
    }

    token_from_body(&body, Utc::now().timestamp())
}

fn token_from_body(body: &str, now: i64) -> Result<Token, TwitchError> {
    let token_resp: TokenResponse = serde_json::from_str(body)
        .map_err(|e| TwitchError::TokenRefreshFailed(format!("failed to parse response: {e}")))?;

    Ok(Token {
        access_token: token_resp.access_token,
        refresh_token: token_resp.refresh_token.unwrap_or_default(),
        scope: token_resp.scope.map(|s| s.join(" ")).unwrap_or_default(),
        expires_at: now + token_resp.expires_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_expiring_at(expires_at: i64, refresh_token: &str) -> Token {
        Token {
            access_token: "abc".into(),
            refresh_token: refresh_token.into(),
            scope: "chat:read".into(),
            expires_at,
        }
    }

    #[test]
    fn test_auth_url_generation() {
        let auth = TwitchAuth::new(
            "test_client_id".into(),
            "test_secret".into(),
            "http://localhost:8080/callback".into(),
        );
        let url = auth.get_auth_url(&["chat:read", "user:read:chat"]).unwrap();

        assert!(url.starts_with("https://id.twitch.tv/oauth2/authorize"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("force_verify=true"));
        assert!(url.contains("user%3Aread%3Achat"));
    }

    #[test]
    fn test_auth_url_uses_custom_base() {
        let auth = TwitchAuth::new("id".into(), "secret".into(), "http://localhost".into())
            .with_base_url("http://127.0.0.1:9999/oauth2/");
        let url = auth.get_auth_url(&[]).unwrap();
        assert!(url.starts_with("http://127.0.0.1:9999/oauth2/authorize?"));
    }

    #[test]
    fn test_needs_refresh_margin() {
        let now = 1_000_000;
        assert!(!needs_refresh(&token_expiring_at(now + 7200, "r"), now));
        assert!(needs_refresh(&token_expiring_at(now + 60, "r"), now));
        assert!(needs_refresh(&token_expiring_at(now - 1, "r"), now));
    }

    #[test]
    fn test_token_from_client_credentials_body() {
        let body = r#"{"access_token":"app","expires_in":5011271,"token_type":"bearer"}"#;
        let token = token_from_body(body, 100).unwrap();

        assert_eq!(token.access_token, "app");
        assert!(token.refresh_token.is_empty());
        assert_eq!(token.expires_at, 100 + 5011271);
    }

    #[test]
    fn test_token_from_user_body_joins_scopes() {
        let body = r#"{"access_token":"u","refresh_token":"r","expires_in":10,"scope":["chat:read","chat:edit"]}"#;
        let token = token_from_body(body, 0).unwrap();

        assert_eq!(token.refresh_token, "r");
        assert_eq!(token.scope, "chat:read chat:edit");
    }

    #[tokio::test]
    async fn test_get_or_refresh_still_valid() {
        let auth = TwitchAuth::new("id".into(), "secret".into(), "http://localhost".into());
        let token = token_expiring_at(Utc::now().timestamp() + 7200, "def");

        let result = auth.get_or_refresh_token(&token).await.unwrap();
        assert!(result.is_none(), "Should not refresh a valid token");
    }

    #[tokio::test]
    async fn test_get_or_refresh_without_refresh_token() {
        let auth = TwitchAuth::new("id".into(), "secret".into(), "http://localhost".into());
        let token = token_expiring_at(Utc::now().timestamp() - 10, "");

        let err = auth.get_or_refresh_token(&token).await.unwrap_err();
        assert!(matches!(err, TwitchError::AuthRequired));
    }

    #[test]
    fn test_token_info_deserializes_app_token() {
        let body = r#"{"client_id":"cid","scopes":[],"expires_in":3600}"#;
        let info: TokenInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.login, None);
        assert_eq!(info.expires_in, 3600);
    }
}
