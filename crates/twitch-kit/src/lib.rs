//! Twitch integration client library.
//!
//! Provides a Helix REST API client built from fluent call builders,
//! an IRC chat client, a PubSub client and OAuth token helpers.

pub mod api;
pub mod auth;
pub mod config;
pub mod irc;
pub mod pubsub;

mod backoff;

use serde::{Deserialize, Serialize};

pub use config::TwitchConfig;

/// Token data for OAuth authentication.
///
/// The caller is responsible for persisting this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub expires_at: i64,
}

/// Unified error type for the twitch-kit crate.
#[derive(Debug, thiserror::Error)]
pub enum TwitchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication required: no valid token")]
    AuthRequired,

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Twitch API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("IRC error: {0}")]
    Irc(String),

    #[error("PubSub error: {0}")]
    PubSub(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Create a Helix API client for the given application client ID.
///
/// Use [`api::Client::builder`] when the defaults need adjusting.
pub fn api(client_id: impl Into<String>) -> api::Client {
    api::Client::new(client_id)
}

/// Create an anonymous IRC chat client.
pub fn irc() -> irc::IrcClient {
    irc::IrcClient::new()
}

/// Create a PubSub client with no topics registered yet.
pub fn pubsub() -> pubsub::PubSubClient {
    pubsub::PubSubClient::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_defaults() {
        let client = api("cid");
        assert_eq!(client.client_id(), "cid");
        assert_eq!(client.base_url(), config::DEFAULT_API_BASE_URL);

        assert_eq!(irc().config().url, config::DEFAULT_IRC_URL);
        assert_eq!(pubsub().topics().count(), 0);
    }

    #[test]
    fn api_error_display() {
        let err = TwitchError::ApiError {
            status: 400,
            message: "Malformed query params.".into(),
        };
        assert_eq!(
            err.to_string(),
            "Twitch API error (status 400): Malformed query params."
        );
    }
}
