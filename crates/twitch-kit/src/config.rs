//! Client configuration with environment overrides.

/// Default Helix REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.twitch.tv/helix";
/// Default OAuth endpoint.
pub const DEFAULT_AUTH_BASE_URL: &str = "https://id.twitch.tv/oauth2";
/// Default IRC-over-WebSocket endpoint.
pub const DEFAULT_IRC_URL: &str = "wss://irc-ws.chat.twitch.tv:443";
/// Default PubSub endpoint.
pub const DEFAULT_PUBSUB_URL: &str = "wss://pubsub-edge.twitch.tv";

/// Connection settings shared by the API, IRC and PubSub clients.
#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub api_base_url: String,
    pub auth_base_url: String,
    pub irc_url: String,
    pub pubsub_url: String,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            access_token: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.into(),
            irc_url: DEFAULT_IRC_URL.into(),
            pubsub_url: DEFAULT_PUBSUB_URL.into(),
        }
    }
}

impl TwitchConfig {
    /// Build a config from defaults overridden by `TWITCH_*` environment variables.
    ///
    /// Empty variables are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let g = |key: &str, fallback: String| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };
        let defaults = Self::default();

        Self {
            client_id: g("TWITCH_CLIENT_ID", defaults.client_id),
            client_secret: g("TWITCH_CLIENT_SECRET", defaults.client_secret),
            access_token: g("TWITCH_ACCESS_TOKEN", defaults.access_token),
            api_base_url: g("TWITCH_API_BASE_URL", defaults.api_base_url),
            auth_base_url: g("TWITCH_AUTH_BASE_URL", defaults.auth_base_url),
            irc_url: g("TWITCH_IRC_URL", defaults.irc_url),
            pubsub_url: g("TWITCH_PUBSUB_URL", defaults.pubsub_url),
        }
    }

    /// Whether an application client ID is present.
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
    }
}
