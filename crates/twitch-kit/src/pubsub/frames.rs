use serde::{Deserialize, Serialize};

use super::*;

#[derive(Debug, Serialize)]
struct OutgoingFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<TopicsData<'a>>,
}

#[derive(Debug, Serialize)]
struct TopicsData<'a> {
    topics: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(super) struct IncomingFrame {
    #[serde(rename = "type")]
    pub(super) frame_type: String,
    #[serde(default)]
    pub(super) nonce: Option<String>,
    #[serde(default)]
    pub(super) error: Option<String>,
    #[serde(default)]
    pub(super) data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct MessageData {
    pub(super) topic: String,
    /// JSON document encoded as a string.
    pub(super) message: String,
}

pub(super) fn ping_frame() -> Result<String, TwitchError> {
    Ok(serde_json::to_string(&OutgoingFrame {
        frame_type: "PING",
        nonce: None,
        data: None,
    })?)
}

pub(super) fn listen_frame(
    nonce: &str,
    topics: &[String],
    auth_token: Option<&str>,
) -> Result<String, TwitchError> {
    Ok(serde_json::to_string(&OutgoingFrame {
        frame_type: "LISTEN",
        nonce: Some(nonce),
        data: Some(TopicsData { topics, auth_token }),
    })?)
}

pub(super) fn unlisten_frame(nonce: &str, topics: &[String]) -> Result<String, TwitchError> {
    Ok(serde_json::to_string(&OutgoingFrame {
        frame_type: "UNLISTEN",
        nonce: Some(nonce),
        data: Some(TopicsData {
            topics,
            auth_token: None,
        }),
    })?)
}

pub(super) fn new_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// One LISTEN frame per distinct token, covering every registered topic.
pub(super) fn listen_frames(
    topics: &BTreeMap<String, Option<String>>,
) -> Result<Vec<String>, TwitchError> {
    let mut by_token: BTreeMap<Option<&str>, Vec<String>> = BTreeMap::new();
    for (topic, token) in topics {
        by_token
            .entry(token.as_deref())
            .or_default()
            .push(topic.clone());
    }
    by_token
        .into_iter()
        .map(|(token, topics)| listen_frame(&new_nonce(), &topics, token))
        .collect()
}

/// Decode the payload of a MESSAGE frame.
pub(super) fn decode_message(data: serde_json::Value) -> Result<PubSubEvent, TwitchError> {
    let data: MessageData = serde_json::from_value(data)?;
    let message = match serde_json::from_str::<serde_json::Value>(&data.message) {
        Ok(value) => value,
        Err(_) => serde_json::Value::String(data.message),
    };
    Ok(PubSubEvent::Message {
        topic: data.topic,
        message,
    })
}
