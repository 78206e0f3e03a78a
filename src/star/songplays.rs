//! Songplays fact table: plays left-joined against the song catalog

use super::logs::PlayEvent;
use super::tables::SongplayRow;
use crate::records::SongRecord;
use rayon::prelude::*;
use std::collections::HashMap;

/// Plays handled by one parallel shard when assigning ids
pub const ROWS_PER_SHARD: usize = 8192;

/// Low bits of a songplay id that hold the offset within its shard
const OFFSET_BITS: u32 = 33;

/// Id of the `offset`-th play of shard `shard`
///
/// Ids are unique within a run and increase with play order, but jump
/// between shards.
pub fn songplay_id(shard: usize, offset: usize) -> i64 {
    ((shard as i64) << OFFSET_BITS) | offset as i64
}

/// Catalog attributes attached to a matched play
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatch {
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
}

/// Song catalog indexed by artist name, then title
///
/// Matching is exact and case-sensitive. Records missing either key can never
/// match, and when several records share both keys the first one wins.
#[derive(Debug, Default)]
pub struct SongCatalog {
    by_artist: HashMap<String, HashMap<String, CatalogMatch>>,
    len: usize,
}

impl SongCatalog {
    pub fn build(songs: &[SongRecord]) -> Self {
        let mut catalog = SongCatalog::default();
        for song in songs {
            let (Some(artist), Some(title)) = (&song.artist_name, &song.title) else {
                continue;
            };
            let titles = catalog.by_artist.entry(artist.clone()).or_default();
            if !titles.contains_key(title) {
                titles.insert(
                    title.clone(),
                    CatalogMatch {
                        song_id: song.song_id.clone(),
                        artist_id: song.artist_id.clone(),
                    },
                );
                catalog.len += 1;
            }
        }
        catalog
    }

    pub fn lookup(&self, artist: Option<&str>, title: Option<&str>) -> Option<&CatalogMatch> {
        self.by_artist.get(artist?)?.get(title?)
    }

    /// Number of distinct (artist, title) keys
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Result of the songplays join
#[derive(Debug)]
pub struct SongplayBuild {
    pub rows: Vec<SongplayRow>,
    /// Plays that found a catalog entry
    pub matched: usize,
}

/// Build one fact row per play
pub fn build_songplays(events: &[PlayEvent], catalog: &SongCatalog) -> SongplayBuild {
    let rows: Vec<SongplayRow> = events
        .par_chunks(ROWS_PER_SHARD)
        .enumerate()
        .flat_map_iter(|(shard, chunk)| {
            chunk.iter().enumerate().map(move |(offset, event)| {
                let record = &event.record;
                let hit = catalog.lookup(record.artist.as_deref(), record.song.as_deref());
                SongplayRow {
                    songplay_id: songplay_id(shard, offset),
                    start_time: event.start_time,
                    user_id: record.user_id.clone(),
                    level: record.level.clone(),
                    song_id: hit.and_then(|m| m.song_id.clone()),
                    artist_id: hit.and_then(|m| m.artist_id.clone()),
                    session_id: record.session_id,
                    location: record.location.clone(),
                    user_agent: record.user_agent.clone(),
                    year: event.calendar.year,
                    month: event.calendar.month,
                }
            })
        })
        .collect();

    let matched = events
        .par_iter()
        .filter(|e| {
            catalog
                .lookup(e.record.artist.as_deref(), e.record.song.as_deref())
                .is_some()
        })
        .count();

    SongplayBuild { rows, matched }
}
