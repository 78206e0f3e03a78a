//! Star schema transforms
//!
//! Turns song catalog records and activity log records into the four
//! dimension tables (songs, artists, users, time) and the songplays fact
//! table. Every transform is a pure function over in-memory rows and runs
//! data-parallel.

pub mod calendar;
pub mod logs;
pub mod songplays;
pub mod songs;
pub mod tables;

pub use calendar::{calendar_fields, epoch_millis_to_timestamp, CalendarFields};
pub use logs::{derive_play_events, extract_time, extract_users, filter_plays, PlayEvent};
pub use songplays::{build_songplays, songplay_id, SongCatalog, SongplayBuild};
pub use songs::{extract_artists, extract_songs};
pub use tables::{ArtistRow, SongRow, SongplayRow, Table, TimeRow, UserRow};

use serde::{Deserialize, Serialize};

/// What to do with repeated keys in the artists and users dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Emit one dimension row per source row, duplicates included
    #[default]
    Preserve,
    /// Keep one row per key: the first artist row, the latest user row
    Deduplicate,
}

/// What to do with a play event whose `ts` cannot be converted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Fail the run
    #[default]
    Abort,
    /// Log a warning and leave the event out of every log-derived table
    DropRow,
}
