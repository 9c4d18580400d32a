use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Wrapper for Twitch Helix paginated responses.
#[derive(Debug, Deserialize)]
pub struct HelixPaginatedResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<HelixPagination>,
}

#[derive(Debug, Deserialize)]
pub struct HelixPagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Error body returned with non-success Helix statuses.
#[derive(Debug, Deserialize)]
pub struct HelixError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

/// Channel entry from GET /helix/search/channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchChannel {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(rename = "broadcaster_login")]
    pub user_login: String,
    #[serde(rename = "display_name")]
    pub user_display_name: String,
    pub game_id: String,
    pub game_name: String,
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(rename = "broadcaster_language")]
    pub language: String,
    pub thumbnail_url: String,
    pub is_live: bool,
    // Offline channels report an empty string here.
    #[serde(deserialize_with = "optional_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Game or category entry from GET /helix/search/categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCategory {
    pub id: String,
    pub name: String,
    pub box_art_url: String,
}

/// Live stream from GET /helix/streams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub game_id: String,
    pub game_name: String,
    #[serde(rename = "type")]
    pub stream_type: String,
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    pub viewer_count: u64,
    #[serde(deserialize_with = "optional_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    pub language: String,
    pub thumbnail_url: String,
    pub is_mature: bool,
}

/// User from GET /helix/users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub user_type: String,
    pub broadcaster_type: String,
    pub description: String,
    pub profile_image_url: String,
    pub offline_image_url: String,
    #[serde(deserialize_with = "optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}
