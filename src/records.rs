//! Raw records as they appear in the two sources.
//!
//! Every field is optional: the sources are loosely typed JSON and a missing
//! key simply becomes a null column downstream.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page value of a log record that represents a song play
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// One entry of the song catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongRecord {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub duration: Option<f64>,
    pub year: Option<i64>,
    pub num_songs: Option<i64>,
}

/// One application event from the activity log
///
/// `ts` is kept as the raw JSON value; it is only interpreted when the
/// start time is derived, so that a bad value is reported as a timestamp
/// error instead of failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogRecord {
    pub artist: Option<String>,
    pub auth: Option<String>,
    pub first_name: Option<String>,
    pub gender: Option<String>,
    pub item_in_session: Option<i64>,
    pub last_name: Option<String>,
    pub length: Option<f64>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub method: Option<String>,
    pub page: Option<String>,
    pub registration: Option<f64>,
    pub session_id: Option<i64>,
    pub song: Option<String>,
    pub status: Option<i64>,
    pub ts: Value,
    pub user_agent: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: Option<String>,
}

impl LogRecord {
    /// Whether this event is a song play
    pub fn is_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }
}

/// User ids show up both as `"39"` and `39` depending on the producer
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or a number, found {}",
            other
        ))),
    }
}
