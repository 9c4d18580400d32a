use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as Msg;

use super::connection::{LineAction, handle_line};
use super::*;

const TAGGED_PRIVMSG: &str = "@badge-info=;badges=broadcaster/1;color=#0D4200;display-name=Ronni;emotes=25:0-4;id=b34ccfc7-4977-403a-8a94-33c6bac34fb8;mod=0;user-id=1337;bits=100 :ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #ronni :Kappa Keepo Kappa\r\n";

#[test]
fn parses_tags_prefix_and_params() {
    let msg = IrcMessage::parse(TAGGED_PRIVMSG).unwrap();

    assert_eq!(msg.command, "PRIVMSG");
    assert_eq!(msg.prefix.as_deref(), Some("ronni!ronni@ronni.tmi.twitch.tv"));
    assert_eq!(msg.nick(), Some("ronni"));
    assert_eq!(msg.params, vec!["#ronni".to_string(), "Kappa Keepo Kappa".to_string()]);
    assert_eq!(msg.tag("display-name"), Some("Ronni"));
    assert_eq!(msg.tag("emotes"), Some("25:0-4"));
    assert_eq!(msg.tag("badge-info"), None);
    assert!(msg.tags.contains_key("badge-info"));
}

#[test]
fn unescapes_tag_values() {
    let msg = IrcMessage::parse(r"@system-msg=5\sraiders\sfrom\:\sx\\y;flag :tmi.twitch.tv USERNOTICE #chan").unwrap();

    assert_eq!(msg.tag("system-msg"), Some(r"5 raiders from; x\y"));
    assert_eq!(msg.tags.get("flag").map(String::as_str), Some(""));
}

#[test]
fn parses_command_without_prefix() {
    let msg = IrcMessage::parse("PING :tmi.twitch.tv").unwrap();
    assert_eq!(msg.command, "PING");
    assert_eq!(msg.prefix, None);
    assert_eq!(msg.trailing(), Some("tmi.twitch.tv"));
}

#[test]
fn parses_middle_params_only() {
    let msg = IrcMessage::parse(":tmi.twitch.tv 001 justinfan123 :Welcome, GLHF!").unwrap();
    assert_eq!(msg.command, "001");
    assert_eq!(msg.param(0), Some("justinfan123"));
    assert_eq!(msg.param(1), Some("Welcome, GLHF!"));
    assert_eq!(msg.nick(), None);
}

#[test]
fn rejects_empty_and_commandless_lines() {
    assert!(IrcMessage::parse("").is_err());
    assert!(IrcMessage::parse("\r\n").is_err());
    assert!(IrcMessage::parse("@a=b").is_err());
    assert!(IrcMessage::parse(":prefix.only").is_err());
}

#[test]
fn display_renders_wire_line() {
    let msg = IrcMessage::new("PRIVMSG", vec!["#chan".into(), "hello there".into()]);
    assert_eq!(msg.to_string(), "PRIVMSG #chan :hello there");

    let msg = IrcMessage::new("JOIN", vec!["#chan".into()]);
    assert_eq!(msg.to_string(), "JOIN #chan");

    let reparsed: IrcMessage = IrcMessage::parse(TAGGED_PRIVMSG)
        .unwrap()
        .to_string()
        .parse()
        .unwrap();
    assert_eq!(reparsed, IrcMessage::parse(TAGGED_PRIVMSG).unwrap());
}

#[test]
fn privmsg_event_extracts_sender_details() {
    let event = IrcEvent::from_message(IrcMessage::parse(TAGGED_PRIVMSG).unwrap());
    let IrcEvent::Privmsg(privmsg) = event else {
        panic!("expected privmsg, got {event:?}");
    };

    assert_eq!(privmsg.channel, "#ronni");
    assert_eq!(privmsg.sender_login, "ronni");
    assert_eq!(privmsg.sender_id.as_deref(), Some("1337"));
    assert_eq!(privmsg.display_name.as_deref(), Some("Ronni"));
    assert_eq!(privmsg.color.as_deref(), Some("#0D4200"));
    assert_eq!(privmsg.bits, Some(100));
    assert!(!privmsg.is_action);
    assert_eq!(privmsg.text, "Kappa Keepo Kappa");
}

#[test]
fn action_messages_are_unwrapped() {
    let line = ":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :\u{1}ACTION waves\u{1}";
    let IrcEvent::Privmsg(privmsg) = IrcEvent::from_message(IrcMessage::parse(line).unwrap()) else {
        panic!("expected privmsg");
    };
    assert!(privmsg.is_action);
    assert_eq!(privmsg.text, "waves");
}

#[test]
fn join_part_and_notice_events() {
    let join = IrcEvent::from_message(
        IrcMessage::parse(":bob!bob@bob.tmi.twitch.tv JOIN #chan").unwrap(),
    );
    assert_eq!(
        join,
        IrcEvent::Join {
            channel: "#chan".into(),
            user: "bob".into()
        }
    );

    let notice = IrcEvent::from_message(
        IrcMessage::parse("@msg-id=slow_on :tmi.twitch.tv NOTICE #chan :This room is now in slow mode.")
            .unwrap(),
    );
    assert_eq!(
        notice,
        IrcEvent::Notice {
            channel: Some("#chan".into()),
            msg_id: Some("slow_on".into()),
            message: "This room is now in slow mode.".into(),
        }
    );
}

#[test]
fn normalize_channel_names() {
    assert_eq!(normalize_channel(" #SomeOne "), Some("#someone".to_string()));
    assert_eq!(normalize_channel("someone"), Some("#someone".to_string()));
    assert_eq!(normalize_channel("#"), None);
    assert_eq!(normalize_channel("two words"), None);
}

#[test]
fn sanitize_text_strips_newlines() {
    assert_eq!(sanitize_text(" hi\r\nthere "), Some("hi  there".to_string()));
    assert_eq!(sanitize_text("\n"), None);
}

#[test]
fn handshake_with_and_without_token() {
    let anonymous = IrcConfig::default();
    let lines = handshake_lines(&anonymous);
    assert_eq!(lines[0], "CAP REQ :twitch.tv/tags twitch.tv/commands");
    assert!(lines.iter().all(|l| !l.starts_with("PASS")));
    assert!(lines.last().unwrap().starts_with("NICK justinfan"));

    let client = IrcClient::new().with_credentials("MyBot", "oauth:secret");
    let lines = handshake_lines(client.config());
    assert!(lines.contains(&"PASS oauth:secret".to_string()));
    assert_eq!(lines.last().unwrap(), "NICK mybot");
}

#[test]
fn client_builder_normalizes_channels() {
    let client = IrcClient::new().join("#Foo").join("  ").join("bar");
    assert_eq!(client.config().channels, vec!["#foo".to_string(), "#bar".to_string()]);
}

#[test]
fn apply_command_tracks_channels() {
    let mut channels = BTreeSet::new();

    assert_eq!(
        apply_command(IrcCommand::Join("#a".into()), &mut channels).as_deref(),
        Some("JOIN #a")
    );
    assert_eq!(apply_command(IrcCommand::Join("#a".into()), &mut channels), None);
    assert_eq!(
        apply_command(
            IrcCommand::Say {
                channel: "#a".into(),
                text: "hi".into()
            },
            &mut channels
        )
        .as_deref(),
        Some("PRIVMSG #a :hi")
    );
    assert_eq!(
        apply_command(IrcCommand::Part("#a".into()), &mut channels).as_deref(),
        Some("PART #a")
    );
    assert!(channels.is_empty());
}

#[tokio::test]
async fn handle_line_answers_ping() {
    let (tx, _rx) = mpsc::channel(4);
    let action = handle_line("PING :tmi.twitch.tv", &tx).await.unwrap();
    assert_eq!(action, LineAction::Reply("PONG :tmi.twitch.tv".into()));
}

#[tokio::test]
async fn handle_line_detects_reconnect_and_login_failure() {
    let (tx, _rx) = mpsc::channel(4);
    assert_eq!(
        handle_line(":tmi.twitch.tv RECONNECT", &tx).await.unwrap(),
        LineAction::Reconnect
    );

    let err = handle_line(":tmi.twitch.tv NOTICE * :Login authentication failed", &tx)
        .await
        .unwrap_err();
    assert!(matches!(err, TwitchError::AuthRequired));
}

#[tokio::test]
async fn handle_line_forwards_events() {
    let (tx, mut rx) = mpsc::channel(4);
    let action = handle_line(TAGGED_PRIVMSG.trim_end(), &tx).await.unwrap();
    assert_eq!(action, LineAction::Continue);
    assert!(matches!(rx.recv().await, Some(IrcEvent::Privmsg(_))));

    drop(rx);
    let action = handle_line(":tmi.twitch.tv 001 justinfan1 :Welcome", &tx).await.unwrap();
    assert_eq!(action, LineAction::Stop);
}

#[tokio::test]
async fn handle_rejects_invalid_input_before_sending() {
    let (tx, _rx) = mpsc::channel(4);
    let handle = IrcHandle { tx };

    assert!(matches!(handle.say("#", "hi").await, Err(TwitchError::Irc(_))));
    assert!(matches!(handle.say("#chan", " \n ").await, Err(TwitchError::Irc(_))));
    assert!(handle.join("#chan").await.is_ok());
}

#[tokio::test]
async fn handle_reports_stopped_loop() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let handle = IrcHandle { tx };
    assert!(matches!(handle.part("#chan").await, Err(TwitchError::Irc(_))));
}

async fn local_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_line(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            Some(Ok(Msg::Text(text))) => return text.as_str().trim_end().to_string(),
            Some(Ok(_)) => continue,
            other => panic!("socket ended: {other:?}"),
        }
    }
}

async fn send_line(ws: &mut WebSocketStream<TcpStream>, line: &str) {
    ws.send(Msg::Text(format!("{line}\r\n").into())).await.unwrap();
}

async fn next_event(rx: &mut mpsc::Receiver<IrcEvent>) -> Option<IrcEvent> {
    timeout(Duration::from_secs(5), rx.recv()).await.unwrap()
}

/// Read the login lines up to and including NICK.
async fn read_login(ws: &mut WebSocketStream<TcpStream>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let line = next_line(ws).await;
        let done = line.starts_with("NICK ");
        lines.push(line);
        if done {
            return lines;
        }
    }
}

#[tokio::test]
async fn session_logs_in_then_joins_channels() {
    let (listener, url) = local_server().await;
    let (mut rx, handle) = IrcClient::new()
        .url(&url)
        .with_credentials("Bot", "oauth:secret")
        .join("Chan")
        .connect()
        .await
        .unwrap();

    let mut ws = accept(&listener).await;
    assert_eq!(
        read_login(&mut ws).await,
        vec![
            "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
            "PASS oauth:secret".to_string(),
            "NICK bot".to_string(),
        ]
    );
    assert_eq!(next_line(&mut ws).await, "JOIN #chan");

    send_line(&mut ws, ":tmi.twitch.tv 001 bot :Welcome, GLHF!").await;
    assert_eq!(next_event(&mut rx).await, Some(IrcEvent::Connected));

    handle.say("#chan", "hello\nthere").await.unwrap();
    assert_eq!(next_line(&mut ws).await, "PRIVMSG #chan :hello there");

    handle.shutdown().await;
    assert_eq!(next_line(&mut ws).await, "QUIT");
    assert_eq!(next_event(&mut rx).await, None);
}

#[tokio::test]
async fn server_ping_is_answered_on_the_wire() {
    let (listener, url) = local_server().await;
    let (mut rx, handle) = IrcClient::new().url(&url).connect().await.unwrap();

    let mut ws = accept(&listener).await;
    let login = read_login(&mut ws).await;
    assert!(login.iter().all(|line| !line.starts_with("PASS")));

    send_line(&mut ws, "PING :tmi.twitch.tv").await;
    assert_eq!(next_line(&mut ws).await, "PONG :tmi.twitch.tv");

    send_line(&mut ws, ":ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #ronni :hi").await;
    match next_event(&mut rx).await {
        Some(IrcEvent::Privmsg(msg)) => assert_eq!(msg.text, "hi"),
        other => panic!("unexpected event: {other:?}"),
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn reconnect_rejoins_tracked_channels() {
    let (listener, url) = local_server().await;
    let (mut rx, handle) = IrcClient::new().url(&url).join("a").connect().await.unwrap();

    let mut first = accept(&listener).await;
    read_login(&mut first).await;
    assert_eq!(next_line(&mut first).await, "JOIN #a");

    handle.join("b").await.unwrap();
    assert_eq!(next_line(&mut first).await, "JOIN #b");
    handle.part("a").await.unwrap();
    assert_eq!(next_line(&mut first).await, "PART #a");
    handle.join("c").await.unwrap();
    assert_eq!(next_line(&mut first).await, "JOIN #c");

    send_line(&mut first, ":tmi.twitch.tv RECONNECT").await;
    assert_eq!(next_event(&mut rx).await, Some(IrcEvent::Reconnecting));

    let mut second = accept(&listener).await;
    read_login(&mut second).await;
    assert_eq!(next_line(&mut second).await, "JOIN #b");
    assert_eq!(next_line(&mut second).await, "JOIN #c");

    handle.shutdown().await;
    assert_eq!(next_event(&mut rx).await, None);
}

#[tokio::test]
async fn login_failure_stops_the_loop() {
    let (listener, url) = local_server().await;
    let (mut rx, _handle) = IrcClient::new()
        .url(&url)
        .with_credentials("bot", "bad")
        .connect()
        .await
        .unwrap();

    let mut ws = accept(&listener).await;
    read_login(&mut ws).await;
    send_line(&mut ws, ":tmi.twitch.tv NOTICE * :Login authentication failed").await;

    assert_eq!(next_event(&mut rx).await, None);
}
