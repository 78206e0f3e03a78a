use super::calendar::{calendar_fields, epoch_millis_to_timestamp, CalendarFields};
use super::tables::{TimeRow, UserRow};
use super::{DedupPolicy, TimestampPolicy};
use crate::error::Result;
use crate::records::LogRecord;
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A song play with its derived start time
#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub record: LogRecord,
    pub start_time: NaiveDateTime,
    pub calendar: CalendarFields,
}

impl PlayEvent {
    /// Derive the start time and calendar fields of one play
    pub fn from_record(record: LogRecord) -> Result<Self> {
        let start_time = epoch_millis_to_timestamp(&record.ts)?;
        Ok(PlayEvent {
            calendar: calendar_fields(start_time),
            start_time,
            record,
        })
    }
}

/// Keep only the `NextSong` events
pub fn filter_plays(records: Vec<LogRecord>) -> Vec<LogRecord> {
    records.into_par_iter().filter(LogRecord::is_play).collect()
}

/// Derive start time and calendar fields for every play
///
/// Under [`TimestampPolicy::Abort`] the first play (in input order) with a bad
/// `ts` fails the whole derivation. Under [`TimestampPolicy::DropRow`] such
/// plays are left out.
pub fn derive_play_events(plays: Vec<LogRecord>, policy: TimestampPolicy) -> Result<Vec<PlayEvent>> {
    let derived: Vec<Result<PlayEvent>> = plays
        .into_par_iter()
        .map(PlayEvent::from_record)
        .collect();

    match policy {
        TimestampPolicy::Abort => derived.into_iter().collect(),
        TimestampPolicy::DropRow => {
            let mut dropped = 0usize;
            let events: Vec<PlayEvent> = derived
                .into_iter()
                .filter_map(|event| match event {
                    Ok(event) => Some(event),
                    Err(err) => {
                        debug!("Dropping play event: {}", err);
                        dropped += 1;
                        None
                    }
                })
                .collect();
            if dropped > 0 {
                warn!("Dropped {} play events with an unusable ts", dropped);
            }
            Ok(events)
        }
    }
}

fn user_row(record: &LogRecord) -> UserRow {
    UserRow {
        user_id: record.user_id.clone(),
        first_name: record.first_name.clone(),
        last_name: record.last_name.clone(),
        gender: record.gender.clone(),
        level: record.level.clone(),
    }
}

/// Project plays onto the users dimension
///
/// With [`DedupPolicy::Deduplicate`] each user keeps the row of their most
/// recent play, so `level` reflects the latest subscription; the row stays at
/// the position of the user's first play.
pub fn extract_users(events: &[PlayEvent], dedup: DedupPolicy) -> Vec<UserRow> {
    match dedup {
        DedupPolicy::Preserve => events.par_iter().map(|e| user_row(&e.record)).collect(),
        DedupPolicy::Deduplicate => {
            let mut rows: Vec<(Option<NaiveDateTime>, UserRow)> = Vec::new();
            let mut positions: HashMap<&str, usize> = HashMap::new();

            for event in events {
                let Some(user_id) = event.record.user_id.as_deref() else {
                    rows.push((None, user_row(&event.record)));
                    continue;
                };
                match positions.get(user_id) {
                    Some(&pos) => {
                        let latest = &mut rows[pos];
                        if latest.0.map_or(true, |seen| event.start_time >= seen) {
                            *latest = (Some(event.start_time), user_row(&event.record));
                        }
                    }
                    None => {
                        positions.insert(user_id, rows.len());
                        rows.push((Some(event.start_time), user_row(&event.record)));
                    }
                }
            }

            rows.into_iter().map(|(_, row)| row).collect()
        }
    }
}

/// Project plays onto the time dimension, one row per play
pub fn extract_time(events: &[PlayEvent]) -> Vec<TimeRow> {
    events
        .par_iter()
        .map(|e| TimeRow {
            start_time: e.start_time,
            hour: e.calendar.hour,
            day: e.calendar.day,
            week: e.calendar.week,
            month: e.calendar.month,
            year: e.calendar.year,
            weekday: e.calendar.weekday,
        })
        .collect()
}
