use super::tables::{ArtistRow, SongRow};
use super::DedupPolicy;
use crate::records::SongRecord;
use rayon::prelude::*;
use std::collections::HashSet;

/// Project catalog records onto the songs dimension, one row per record
pub fn extract_songs(records: &[SongRecord]) -> Vec<SongRow> {
    records
        .par_iter()
        .map(|r| SongRow {
            song_id: r.song_id.clone(),
            title: r.title.clone(),
            artist_id: r.artist_id.clone(),
            year: r.year,
            duration: r.duration,
        })
        .collect()
}

/// Project catalog records onto the artists dimension
///
/// With [`DedupPolicy::Preserve`] an artist with N songs yields N rows. With
/// [`DedupPolicy::Deduplicate`] the first row per artist id is kept; rows
/// without an artist id are always kept.
pub fn extract_artists(records: &[SongRecord], dedup: DedupPolicy) -> Vec<ArtistRow> {
    let rows: Vec<ArtistRow> = records
        .par_iter()
        .map(|r| ArtistRow {
            artist_id: r.artist_id.clone(),
            name: r.artist_name.clone(),
            location: r.artist_location.clone(),
            latitude: r.artist_latitude,
            longitude: r.artist_longitude,
        })
        .collect();

    match dedup {
        DedupPolicy::Preserve => rows,
        DedupPolicy::Deduplicate => {
            let mut seen = HashSet::new();
            rows.into_iter()
                .filter(|row| match &row.artist_id {
                    Some(id) => seen.insert(id.clone()),
                    None => true,
                })
                .collect()
        }
    }
}
