//! Twitch IRC chat client over WebSocket.
//!
//! Connects to wss://irc-ws.chat.twitch.tv, requests the tags and commands
//! capabilities, joins the configured channels and forwards chat traffic as
//! [`IrcEvent`]s. Reconnects with exponential backoff and re-joins every
//! channel it was in.

mod connection;
mod message;
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::mpsc;

pub use message::IrcMessage;

use crate::TwitchError;
use crate::backoff::{self, Reconnect};
use crate::config::{DEFAULT_IRC_URL, TwitchConfig};

/// Capabilities requested after connecting.
pub const DEFAULT_CAPABILITIES: &[&str] = &["twitch.tv/tags", "twitch.tv/commands"];

/// IRC connection settings.
#[derive(Debug, Clone)]
pub struct IrcConfig {
    pub url: String,
    pub nick: String,
    /// Without the `oauth:` prefix. `None` connects anonymously (read-only).
    pub access_token: Option<String>,
    pub channels: Vec<String>,
    pub capabilities: Vec<String>,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_IRC_URL.into(),
            nick: anonymous_nick(),
            access_token: None,
            channels: Vec::new(),
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A chat message sent to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage {
    pub channel: String,
    pub sender_login: String,
    pub sender_id: Option<String>,
    pub display_name: Option<String>,
    pub message_id: Option<String>,
    pub color: Option<String>,
    pub bits: Option<u64>,
    /// `/me` message; `text` has the CTCP framing removed.
    pub is_action: bool,
    pub text: String,
    pub tags: BTreeMap<String, String>,
}

/// Events delivered by [`IrcClient::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// The server accepted the login (numeric 001).
    Connected,
    Privmsg(PrivateMessage),
    Join { channel: String, user: String },
    Part { channel: String, user: String },
    Notice {
        channel: Option<String>,
        msg_id: Option<String>,
        message: String,
    },
    /// Subs, raids and other channel announcements.
    UserNotice(IrcMessage),
    /// The connection dropped and the client is reconnecting.
    Reconnecting,
    /// Anything without a dedicated variant.
    Raw(IrcMessage),
}

impl IrcEvent {
    pub(crate) fn from_message(msg: IrcMessage) -> Self {
        let command = msg.command.clone();
        match command.as_str() {
            "001" => IrcEvent::Connected,
            "PRIVMSG" => match private_message(&msg) {
                Some(privmsg) => IrcEvent::Privmsg(privmsg),
                None => IrcEvent::Raw(msg),
            },
            "JOIN" | "PART" => {
                let user = msg.nick().map(str::to_string);
                let channel = msg.param(0).map(str::to_string);
                match (user, channel) {
                    (Some(user), Some(channel)) if msg.command == "JOIN" => {
                        IrcEvent::Join { channel, user }
                    }
                    (Some(user), Some(channel)) => IrcEvent::Part { channel, user },
                    _ => IrcEvent::Raw(msg),
                }
            }
            "NOTICE" => IrcEvent::Notice {
                channel: msg.param(0).filter(|c| c.starts_with('#')).map(str::to_string),
                msg_id: msg.tag("msg-id").map(str::to_string),
                message: msg.trailing().unwrap_or_default().to_string(),
            },
            "USERNOTICE" => IrcEvent::UserNotice(msg),
            _ => IrcEvent::Raw(msg),
        }
    }
}

fn private_message(msg: &IrcMessage) -> Option<PrivateMessage> {
    let channel = msg.param(0)?.to_string();
    let raw_text = msg.param(1)?;
    let sender_login = msg.nick()?.to_string();

    let (is_action, text) = match raw_text
        .strip_prefix("\u{1}ACTION ")
        .map(|t| t.trim_end_matches('\u{1}'))
    {
        Some(action) => (true, action.to_string()),
        None => (false, raw_text.to_string()),
    };

    Some(PrivateMessage {
        channel,
        sender_login,
        sender_id: msg.tag("user-id").map(str::to_string),
        display_name: msg.tag("display-name").map(str::to_string),
        message_id: msg.tag("id").map(str::to_string),
        color: msg.tag("color").map(str::to_string),
        bits: msg.tag("bits").and_then(|b| b.parse().ok()),
        is_action,
        text,
        tags: msg.tags.clone(),
    })
}

/// `#login` form of a channel name, or `None` if nothing is left after trimming.
pub fn normalize_channel(raw: &str) -> Option<String> {
    let login = raw.trim().trim_start_matches('#').trim().to_ascii_lowercase();
    if login.is_empty() || login.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("#{login}"))
}

/// Single-line chat text, or `None` if empty.
fn sanitize_text(raw: &str) -> Option<String> {
    let text = raw.replace(['\r', '\n'], " ").trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

fn anonymous_nick() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 100_000;
    format!("justinfan{n}")
}

#[derive(Debug)]
enum IrcCommand {
    Join(String),
    Part(String),
    Say { channel: String, text: String },
    Shutdown,
}

/// How a single connection ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// Sends commands to a running IRC connection loop.
#[derive(Debug, Clone)]
pub struct IrcHandle {
    tx: mpsc::Sender<IrcCommand>,
}

impl IrcHandle {
    pub async fn join(&self, channel: &str) -> Result<(), TwitchError> {
        let channel = normalize_channel(channel)
            .ok_or_else(|| TwitchError::Irc(format!("invalid channel: {channel:?}")))?;
        self.send(IrcCommand::Join(channel)).await
    }

    pub async fn part(&self, channel: &str) -> Result<(), TwitchError> {
        let channel = normalize_channel(channel)
            .ok_or_else(|| TwitchError::Irc(format!("invalid channel: {channel:?}")))?;
        self.send(IrcCommand::Part(channel)).await
    }

    /// Send a chat message. Requires a token with the `chat:edit` scope.
    pub async fn say(&self, channel: &str, text: &str) -> Result<(), TwitchError> {
        let channel = normalize_channel(channel)
            .ok_or_else(|| TwitchError::Irc(format!("invalid channel: {channel:?}")))?;
        let text = sanitize_text(text).ok_or_else(|| TwitchError::Irc("message is required".into()))?;
        self.send(IrcCommand::Say { channel, text }).await
    }

    /// Stop the connection loop. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(IrcCommand::Shutdown).await;
    }

    async fn send(&self, command: IrcCommand) -> Result<(), TwitchError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TwitchError::Irc("connection loop stopped".into()))
    }
}

/// Twitch IRC client with auto-reconnect.
///
/// Events are delivered via `mpsc::Receiver<IrcEvent>`.
#[derive(Debug, Clone, Default)]
pub struct IrcClient {
    config: IrcConfig,
}

impl IrcClient {
    /// Anonymous client against the public endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: IrcConfig) -> Self {
        Self { config }
    }

    /// Anonymous client using the URL from a loaded [`TwitchConfig`].
    pub fn from_config(config: &TwitchConfig) -> Self {
        Self::new().url(&config.irc_url)
    }

    /// Log in as `nick` with a user access token (`oauth:` prefix optional).
    pub fn with_credentials(mut self, nick: &str, access_token: &str) -> Self {
        self.config.nick = nick.trim().to_ascii_lowercase();
        let token = access_token.trim();
        self.config.access_token = Some(token.strip_prefix("oauth:").unwrap_or(token).to_string());
        self
    }

    /// Join `channel` once connected. Invalid names are ignored.
    pub fn join(mut self, channel: &str) -> Self {
        match normalize_channel(channel) {
            Some(channel) => self.config.channels.push(channel),
            None => tracing::warn!(channel, "Ignoring invalid IRC channel name"),
        }
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.config.url = url.to_string();
        self
    }

    pub fn config(&self) -> &IrcConfig {
        &self.config
    }

    /// Start the connection loop. Returns an event receiver and a command handle.
    pub async fn connect(self) -> Result<(mpsc::Receiver<IrcEvent>, IrcHandle), TwitchError> {
        url::Url::parse(&self.config.url)?;
        let (event_tx, event_rx) = mpsc::channel::<IrcEvent>(256);
        let (cmd_tx, cmd_rx) = mpsc::channel::<IrcCommand>(64);
        tokio::spawn(Self::run_loop(self.config, event_tx, cmd_rx));
        Ok((event_rx, IrcHandle { tx: cmd_tx }))
    }

    async fn run_loop(
        config: IrcConfig,
        event_tx: mpsc::Sender<IrcEvent>,
        mut cmd_rx: mpsc::Receiver<IrcCommand>,
    ) {
        let mut channels: BTreeSet<String> = config.channels.iter().cloned().collect();
        let mut reconnect = Reconnect::default();
        loop {
            reconnect.reset_if_stable("irc");
            match Self::connect_once(&config, &mut channels, &event_tx, &mut cmd_rx).await {
                Ok(SessionEnd::Shutdown) => {
                    tracing::info!("IRC connection closed cleanly");
                    return;
                }
                Ok(SessionEnd::Reconnect) => {
                    reconnect.succeeded();
                    if event_tx.send(IrcEvent::Reconnecting).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    if backoff::is_auth_error(&e) {
                        tracing::warn!(error = %e, "IRC login rejected; stopping loop");
                        return;
                    }
                    let Some(delay) = reconnect.failed() else {
                        tracing::warn!(
                            failures = reconnect.failures(),
                            "IRC failures exceeded threshold; giving up"
                        );
                        return;
                    };
                    tracing::warn!(
                        error = %e, attempt = reconnect.failures(),
                        backoff_secs = delay.as_secs(),
                        "IRC connection failed, will reconnect"
                    );
                    if event_tx.send(IrcEvent::Reconnecting).await.is_err() {
                        return;
                    }
                    if !Self::wait_backoff(delay, &mut channels, &mut cmd_rx).await {
                        tracing::info!("IRC shutdown requested during reconnect backoff");
                        return;
                    }
                }
            }
        }
    }

    /// Sleep for `delay` while still tracking join/part requests.
    /// Returns false when the loop should stop.
    async fn wait_backoff(
        delay: std::time::Duration,
        channels: &mut BTreeSet<String>,
        cmd_rx: &mut mpsc::Receiver<IrcCommand>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(IrcCommand::Shutdown) => return false,
                    Some(IrcCommand::Say { channel, .. }) => {
                        tracing::warn!(channel, "Dropping IRC message while disconnected");
                    }
                    Some(cmd) => {
                        apply_command(cmd, channels);
                    }
                },
            }
        }
    }
}

/// Update the tracked channel set and return the line to send, if any.
fn apply_command(command: IrcCommand, channels: &mut BTreeSet<String>) -> Option<String> {
    match command {
        IrcCommand::Join(channel) => channels
            .insert(channel.clone())
            .then(|| format!("JOIN {channel}")),
        IrcCommand::Part(channel) => channels
            .remove(&channel)
            .then(|| format!("PART {channel}")),
        IrcCommand::Say { channel, text } => Some(format!("PRIVMSG {channel} :{text}")),
        IrcCommand::Shutdown => None,
    }
}

/// Login lines sent right after the socket opens.
fn handshake_lines(config: &IrcConfig) -> Vec<String> {
    let mut lines = Vec::new();
    if !config.capabilities.is_empty() {
        lines.push(format!("CAP REQ :{}", config.capabilities.join(" ")));
    }
    if let Some(token) = &config.access_token {
        lines.push(format!("PASS oauth:{token}"));
    }
    lines.push(format!("NICK {}", config.nick));
    lines
}
