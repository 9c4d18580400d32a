use futures_util::{SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as Msg;

use super::frames::{self, IncomingFrame};
use super::*;

/// What to do after handling one incoming frame.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum FrameAction {
    Continue,
    Pong,
    Reconnect,
    /// The event receiver is gone.
    Stop,
}

impl PubSubClient {
    pub(super) async fn connect_once(
        url: &str,
        keepalive: Keepalive,
        topics: &mut BTreeMap<String, Option<String>>,
        event_tx: &mpsc::Sender<PubSubEvent>,
        cmd_rx: &mut mpsc::Receiver<PubSubCommand>,
    ) -> Result<SessionEnd, TwitchError> {
        tracing::info!(url, topics = topics.len(), "Connecting to PubSub");
        let (mut ws, _) = connect_async(url).await?;

        for frame in frames::listen_frames(topics)? {
            ws.send(Msg::Text(frame.into())).await?;
        }

        let mut ping = tokio::time::interval_at(
            Instant::now() + keepalive.ping_interval,
            keepalive.ping_interval,
        );
        let mut pong_deadline: Option<Instant> = None;

        loop {
            let deadline = pong_deadline;
            let pong_wait = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = ping.tick() => {
                    tracing::trace!("PubSub ping");
                    ws.send(Msg::Text(frames::ping_frame()?.into())).await?;
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + keepalive.pong_timeout);
                    }
                }
                _ = pong_wait => {
                    tracing::warn!("PubSub PONG timeout");
                    let _ = ws.close(None).await;
                    return Err(TwitchError::Timeout);
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None | Some(PubSubCommand::Shutdown) => {
                            tracing::info!("PubSub shutdown during listen");
                            let _ = ws.close(None).await;
                            return Ok(SessionEnd::Shutdown);
                        }
                        Some(cmd) => match check_topic_limit(&cmd, topics) {
                            Ok(()) => {
                                if let Some(frame) = command_frame(&cmd)? {
                                    ws.send(Msg::Text(frame.into())).await?;
                                }
                                track_command(cmd, topics);
                            }
                            Err(error) => {
                                if !reject_listen(error, event_tx).await {
                                    let _ = ws.close(None).await;
                                    return Ok(SessionEnd::Shutdown);
                                }
                            }
                        },
                    }
                }
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Msg::Text(text))) => match handle_frame(text.as_str(), event_tx).await {
                            FrameAction::Continue => {}
                            FrameAction::Pong => pong_deadline = None,
                            FrameAction::Reconnect => {
                                tracing::info!("PubSub RECONNECT received");
                                let _ = ws.close(None).await;
                                return Ok(SessionEnd::Reconnect);
                            }
                            FrameAction::Stop => {
                                let _ = ws.close(None).await;
                                return Ok(SessionEnd::Shutdown);
                            }
                        },
                        Some(Ok(Msg::Ping(data))) => {
                            let _ = ws.send(Msg::Pong(data)).await;
                        }
                        Some(Ok(Msg::Close(_))) | None => {
                            tracing::warn!("PubSub WebSocket closed by server");
                            return Err(TwitchError::PubSub("Server closed".into()));
                        }
                        Some(Err(e)) => return Err(TwitchError::WebSocket(e)),
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }
}

/// Wire frame for a listen/unlisten command.
pub(super) fn command_frame(command: &PubSubCommand) -> Result<Option<String>, TwitchError> {
    let nonce = frames::new_nonce();
    match command {
        PubSubCommand::Listen { topics, token } => {
            tracing::debug!(nonce, count = topics.len(), "PubSub LISTEN");
            frames::listen_frame(&nonce, topics, token.as_deref()).map(Some)
        }
        PubSubCommand::Unlisten { topics } => {
            tracing::debug!(nonce, count = topics.len(), "PubSub UNLISTEN");
            frames::unlisten_frame(&nonce, topics).map(Some)
        }
        PubSubCommand::Shutdown => Ok(None),
    }
}

/// Handle one incoming frame. Malformed frames are logged and skipped.
pub(super) async fn handle_frame(
    text: &str,
    event_tx: &mpsc::Sender<PubSubEvent>,
) -> FrameAction {
    let frame: IncomingFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparsable PubSub frame");
            return FrameAction::Continue;
        }
    };
    let event = match frame.frame_type.as_str() {
        "PONG" => {
            tracing::trace!("PubSub pong");
            return FrameAction::Pong;
        }
        "RECONNECT" => return FrameAction::Reconnect,
        "RESPONSE" => {
            let nonce = frame.nonce.unwrap_or_default();
            let error = frame.error.filter(|e| !e.is_empty());
            if let Some(error) = &error {
                tracing::warn!(nonce, error, "PubSub LISTEN rejected");
            }
            PubSubEvent::ListenResult { nonce, error }
        }
        "MESSAGE" => {
            let decoded = frame
                .data
                .ok_or_else(|| TwitchError::PubSub("MESSAGE frame without data".into()))
                .and_then(frames::decode_message);
            match decoded {
                Ok(event) => {
                    if let PubSubEvent::Message { topic, .. } = &event {
                        tracing::debug!(topic, "PubSub message");
                    }
                    event
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed PubSub MESSAGE");
                    return FrameAction::Continue;
                }
            }
        }
        other => {
            tracing::debug!(frame_type = other, "Unhandled PubSub frame");
            return FrameAction::Continue;
        }
    };

    if event_tx.send(event).await.is_err() {
        return FrameAction::Stop;
    }
    FrameAction::Continue
}
