use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as Msg;

use super::*;

/// Twitch pings roughly every five minutes; silence past this is a dead link.
const READ_TIMEOUT: Duration = Duration::from_secs(6 * 60);

/// What to do after handling one incoming line.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum LineAction {
    Continue,
    Reply(String),
    Reconnect,
    /// The event receiver is gone.
    Stop,
}

impl IrcClient {
    pub(super) async fn connect_once(
        config: &IrcConfig,
        channels: &mut BTreeSet<String>,
        event_tx: &mpsc::Sender<IrcEvent>,
        cmd_rx: &mut mpsc::Receiver<IrcCommand>,
    ) -> Result<SessionEnd, TwitchError> {
        tracing::info!(url = %config.url, nick = %config.nick, "Connecting to Twitch IRC");
        let (mut ws, _) = connect_async(config.url.as_str()).await?;

        for line in handshake_lines(config) {
            ws.send(Msg::Text(line.into())).await?;
        }
        for channel in channels.iter() {
            ws.send(Msg::Text(format!("JOIN {channel}").into())).await?;
        }

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None | Some(IrcCommand::Shutdown) => {
                            tracing::info!("IRC shutdown during listen");
                            let _ = ws.send(Msg::Text("QUIT".into())).await;
                            let _ = ws.close(None).await;
                            return Ok(SessionEnd::Shutdown);
                        }
                        Some(cmd) => {
                            if let Some(line) = apply_command(cmd, channels) {
                                tracing::debug!(line = %line, "IRC command");
                                ws.send(Msg::Text(line.into())).await?;
                            }
                        }
                    }
                }
                result = tokio::time::timeout(READ_TIMEOUT, ws.next()) => {
                    match result {
                        Ok(Some(Ok(Msg::Text(text)))) => {
                            for line in text.as_str().lines().filter(|line| !line.trim().is_empty()) {
                                match handle_line(line, event_tx).await? {
                                    LineAction::Continue => {}
                                    LineAction::Reply(reply) => {
                                        ws.send(Msg::Text(reply.into())).await?;
                                    }
                                    LineAction::Reconnect => {
                                        tracing::info!("IRC RECONNECT received");
                                        let _ = ws.close(None).await;
                                        return Ok(SessionEnd::Reconnect);
                                    }
                                    LineAction::Stop => {
                                        let _ = ws.close(None).await;
                                        return Ok(SessionEnd::Shutdown);
                                    }
                                }
                            }
                        }
                        Ok(Some(Ok(Msg::Ping(data)))) => {
                            let _ = ws.send(Msg::Pong(data)).await;
                        }
                        Ok(Some(Ok(Msg::Close(_)))) | Ok(None) => {
                            tracing::warn!("IRC WebSocket closed by server");
                            return Err(TwitchError::Irc("Server closed".into()));
                        }
                        Ok(Some(Err(e))) => return Err(TwitchError::WebSocket(e)),
                        Ok(Some(Ok(_))) => {}
                        Err(_) => {
                            tracing::warn!("IRC read timeout");
                            return Err(TwitchError::Timeout);
                        }
                    }
                }
            }
        }
    }
}

/// Handle one raw line: answer pings, detect reconnect and login failure,
/// forward everything else as an event.
pub(super) async fn handle_line(
    line: &str,
    event_tx: &mpsc::Sender<IrcEvent>,
) -> Result<LineAction, TwitchError> {
    let msg = match IrcMessage::parse(line) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparsable IRC line");
            return Ok(LineAction::Continue);
        }
    };

    let command = msg.command.clone();
    match command.as_str() {
        "PING" => {
            let payload = msg.trailing().unwrap_or("tmi.twitch.tv");
            tracing::trace!("IRC ping received");
            Ok(LineAction::Reply(format!("PONG :{payload}")))
        }
        "RECONNECT" => Ok(LineAction::Reconnect),
        "NOTICE" if is_login_failure(&msg) => {
            tracing::warn!(notice = msg.trailing().unwrap_or_default(), "IRC login failed");
            Err(TwitchError::AuthRequired)
        }
        "CAP" | "002" | "003" | "004" | "375" | "372" | "376" | "353" | "366" => {
            tracing::trace!(command, "IRC handshake line");
            Ok(LineAction::Continue)
        }
        _ => {
            let event = IrcEvent::from_message(msg);
            if event_tx.send(event).await.is_err() {
                return Ok(LineAction::Stop);
            }
            Ok(LineAction::Continue)
        }
    }
}

fn is_login_failure(msg: &IrcMessage) -> bool {
    msg.trailing().is_some_and(|text| {
        text.contains("Login authentication failed") || text.contains("Improperly formatted auth")
    })
}
