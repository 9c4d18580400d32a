//! Twitch PubSub client.
//!
//! Connects to wss://pubsub-edge.twitch.tv, LISTENs to the registered topics,
//! keeps the session alive with PING frames and delivers topic messages as
//! [`PubSubEvent`]s. Topics are re-sent after every reconnect.

mod connection;
mod frames;

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::TwitchError;
use crate::backoff::{self, Reconnect};
use crate::config::{DEFAULT_PUBSUB_URL, TwitchConfig};

/// Twitch rejects more than this many topics on one connection.
pub const MAX_TOPICS: usize = 50;

/// Twitch asks for a PING at least every five minutes.
const PING_INTERVAL: Duration = Duration::from_secs(4 * 60);
/// Reconnect if no PONG arrives within this window.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Topic name builders.
pub mod topic {
    pub fn channel_points(channel_id: &str) -> String {
        format!("channel-points-channel-v1.{channel_id}")
    }

    pub fn channel_bits(channel_id: &str) -> String {
        format!("channel-bits-events-v2.{channel_id}")
    }

    pub fn channel_bits_badge(channel_id: &str) -> String {
        format!("channel-bits-badge-unlocks.{channel_id}")
    }

    pub fn channel_subscriptions(channel_id: &str) -> String {
        format!("channel-subscribe-events-v1.{channel_id}")
    }

    pub fn chat_moderator_actions(user_id: &str, channel_id: &str) -> String {
        format!("chat_moderator_actions.{user_id}.{channel_id}")
    }

    pub fn whispers(user_id: &str) -> String {
        format!("whispers.{user_id}")
    }
}

/// Events delivered by [`PubSubClient::connect`].
#[derive(Debug, Clone, PartialEq)]
pub enum PubSubEvent {
    /// A message on a subscribed topic. `message` is the decoded inner JSON,
    /// or a JSON string when the payload was not JSON.
    Message {
        topic: String,
        message: serde_json::Value,
    },
    /// Server answer to a LISTEN/UNLISTEN; `error` is e.g. `ERR_BADAUTH`.
    /// A LISTEN that would exceed [`MAX_TOPICS`] is never sent and is
    /// reported here with an empty nonce.
    ListenResult {
        nonce: String,
        error: Option<String>,
    },
    /// The connection dropped and the client is reconnecting.
    Reconnecting,
}

#[derive(Debug)]
enum PubSubCommand {
    Listen {
        topics: Vec<String>,
        token: Option<String>,
    },
    Unlisten {
        topics: Vec<String>,
    },
    Shutdown,
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// Sends commands to a running PubSub connection loop.
#[derive(Debug, Clone)]
pub struct PubSubHandle {
    tx: mpsc::Sender<PubSubCommand>,
}

impl PubSubHandle {
    /// Subscribe to more topics, authenticated with `token` where required.
    ///
    /// The connection loop rejects the request with a
    /// [`PubSubEvent::ListenResult`] error if the live topic set would grow
    /// past [`MAX_TOPICS`].
    pub async fn listen(&self, topics: &[&str], token: Option<&str>) -> Result<(), TwitchError> {
        let topics = clean_topics(topics)?;
        if topics.len() > MAX_TOPICS {
            return Err(too_many_topics(topics.len()));
        }
        self.send(PubSubCommand::Listen {
            topics,
            token: token.map(str::to_string).filter(|t| !t.is_empty()),
        })
        .await
    }

    pub async fn unlisten(&self, topics: &[&str]) -> Result<(), TwitchError> {
        let topics = clean_topics(topics)?;
        self.send(PubSubCommand::Unlisten { topics }).await
    }

    /// Stop the connection loop. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(PubSubCommand::Shutdown).await;
    }

    async fn send(&self, command: PubSubCommand) -> Result<(), TwitchError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TwitchError::PubSub("connection loop stopped".into()))
    }
}

fn clean_topics(topics: &[&str]) -> Result<Vec<String>, TwitchError> {
    let cleaned: Vec<String> = topics
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if cleaned.is_empty() {
        return Err(TwitchError::PubSub("at least one topic is required".into()));
    }
    Ok(cleaned)
}

fn too_many_topics(count: usize) -> TwitchError {
    TwitchError::PubSub(format!("{count} topics requested, at most {MAX_TOPICS} allowed"))
}

/// PING cadence and how long to wait for the matching PONG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Keepalive {
    pub(super) ping_interval: Duration,
    pub(super) pong_timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
        }
    }
}

/// PubSub client with auto-reconnect.
///
/// Events are delivered via `mpsc::Receiver<PubSubEvent>`.
#[derive(Debug, Clone)]
pub struct PubSubClient {
    url: String,
    /// Topic -> auth token.
    topics: BTreeMap<String, Option<String>>,
    keepalive: Keepalive,
}

impl Default for PubSubClient {
    fn default() -> Self {
        Self {
            url: DEFAULT_PUBSUB_URL.into(),
            topics: BTreeMap::new(),
            keepalive: Keepalive::default(),
        }
    }
}

impl PubSubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TwitchConfig) -> Self {
        Self::new().url(&config.pubsub_url)
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// Register a topic to LISTEN to once connected.
    pub fn listen(mut self, topic: &str, token: Option<&str>) -> Self {
        let topic = topic.trim();
        if topic.is_empty() {
            tracing::warn!("Ignoring empty PubSub topic");
            return self;
        }
        self.topics.insert(
            topic.to_string(),
            token.map(str::to_string).filter(|t| !t.is_empty()),
        );
        self
    }

    /// Override the PING interval (4 minutes) and PONG deadline (10 seconds).
    pub fn keepalive(mut self, ping_interval: Duration, pong_timeout: Duration) -> Self {
        self.keepalive = Keepalive {
            ping_interval,
            pong_timeout,
        };
        self
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Start the connection loop. Returns an event receiver and a command handle.
    pub async fn connect(
        self,
    ) -> Result<(mpsc::Receiver<PubSubEvent>, PubSubHandle), TwitchError> {
        url::Url::parse(&self.url)?;
        if self.topics.len() > MAX_TOPICS {
            return Err(too_many_topics(self.topics.len()));
        }
        let (event_tx, event_rx) = mpsc::channel::<PubSubEvent>(256);
        let (cmd_tx, cmd_rx) = mpsc::channel::<PubSubCommand>(64);
        tokio::spawn(Self::run_loop(
            self.url,
            self.topics,
            self.keepalive,
            event_tx,
            cmd_rx,
        ));
        Ok((event_rx, PubSubHandle { tx: cmd_tx }))
    }

    async fn run_loop(
        url: String,
        mut topics: BTreeMap<String, Option<String>>,
        keepalive: Keepalive,
        event_tx: mpsc::Sender<PubSubEvent>,
        mut cmd_rx: mpsc::Receiver<PubSubCommand>,
    ) {
        let mut reconnect = Reconnect::default();
        loop {
            reconnect.reset_if_stable("pubsub");
            match Self::connect_once(&url, keepalive, &mut topics, &event_tx, &mut cmd_rx).await {
                Ok(SessionEnd::Shutdown) => {
                    tracing::info!("PubSub connection closed cleanly");
                    return;
                }
                Ok(SessionEnd::Reconnect) => {
                    reconnect.succeeded();
                    if event_tx.send(PubSubEvent::Reconnecting).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    if backoff::is_auth_error(&e) {
                        tracing::warn!(error = %e, "PubSub auth error; stopping loop");
                        return;
                    }
                    let Some(delay) = reconnect.failed() else {
                        tracing::warn!(
                            failures = reconnect.failures(),
                            "PubSub failures exceeded threshold; giving up"
                        );
                        return;
                    };
                    tracing::warn!(
                        error = %e, attempt = reconnect.failures(),
                        backoff_secs = delay.as_secs(),
                        "PubSub connection failed, will reconnect"
                    );
                    if event_tx.send(PubSubEvent::Reconnecting).await.is_err() {
                        return;
                    }
                    if !Self::wait_backoff(delay, &mut topics, &event_tx, &mut cmd_rx).await {
                        tracing::info!("PubSub shutdown requested during reconnect backoff");
                        return;
                    }
                }
            }
        }
    }

    /// Sleep for `delay` while still tracking listen/unlisten requests.
    /// Returns false when the loop should stop.
    async fn wait_backoff(
        delay: Duration,
        topics: &mut BTreeMap<String, Option<String>>,
        event_tx: &mpsc::Sender<PubSubEvent>,
        cmd_rx: &mut mpsc::Receiver<PubSubCommand>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(PubSubCommand::Shutdown) => return false,
                    Some(cmd) => match check_topic_limit(&cmd, topics) {
                        Ok(()) => track_command(cmd, topics),
                        Err(error) => {
                            if !reject_listen(error, event_tx).await {
                                return false;
                            }
                        }
                    },
                },
            }
        }
    }
}

/// Refuse a LISTEN that would push the live topic set past [`MAX_TOPICS`].
fn check_topic_limit(
    command: &PubSubCommand,
    topics: &BTreeMap<String, Option<String>>,
) -> Result<(), String> {
    let PubSubCommand::Listen { topics: added, .. } = command else {
        return Ok(());
    };
    let mut fresh: Vec<&String> = added.iter().filter(|t| !topics.contains_key(*t)).collect();
    fresh.sort();
    fresh.dedup();
    let total = topics.len() + fresh.len();
    if total > MAX_TOPICS {
        return Err(format!("{total} topics requested, at most {MAX_TOPICS} allowed"));
    }
    Ok(())
}

/// Report a locally rejected LISTEN. Returns false once the receiver is gone.
async fn reject_listen(error: String, event_tx: &mpsc::Sender<PubSubEvent>) -> bool {
    tracing::warn!(error = %error, "PubSub LISTEN rejected before sending");
    event_tx
        .send(PubSubEvent::ListenResult {
            nonce: String::new(),
            error: Some(error),
        })
        .await
        .is_ok()
}

/// Record the effect of a command on the topic set.
fn track_command(command: PubSubCommand, topics: &mut BTreeMap<String, Option<String>>) {
    match command {
        PubSubCommand::Listen { topics: added, token } => {
            for topic in added {
                topics.insert(topic, token.clone());
            }
        }
        PubSubCommand::Unlisten { topics: removed } => {
            for topic in &removed {
                topics.remove(topic);
            }
        }
        PubSubCommand::Shutdown => {}
    }
}
