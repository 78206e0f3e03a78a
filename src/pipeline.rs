//! Pipeline orchestration
//!
//! One run reads the song catalog, writes the song and artist dimensions,
//! reads the event log, writes the user and time dimensions and finally joins
//! plays against the catalog into the songplays fact table. Each stage only
//! depends on the data handed to it by the previous one.

use crate::config::{Locations, PipelineOptions};
use crate::error::Result;
use crate::reader::read_records;
use crate::records::{LogRecord, SongRecord};
use crate::session::Session;
use crate::star::{
    build_songplays, derive_play_events, extract_artists, extract_songs, extract_time,
    extract_users, filter_plays, PlayEvent, SongCatalog, Table,
};
use crate::storage::join_location;
use crate::writer::{PartitionedWriter, WriteSummary};
use std::time::Instant;
use tracing::info;

/// Outcome of a complete run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub songs: WriteSummary,
    pub artists: WriteSummary,
    pub users: WriteSummary,
    pub time: WriteSummary,
    pub songplays: WriteSummary,
    /// Plays that matched a song in the catalog
    pub matched_songplays: usize,
}

impl RunSummary {
    pub fn datasets(&self) -> [&WriteSummary; 5] {
        [&self.songs, &self.artists, &self.users, &self.time, &self.songplays]
    }
}

struct SongStage {
    records: Vec<SongRecord>,
    songs: WriteSummary,
    artists: WriteSummary,
}

struct LogStage {
    events: Vec<PlayEvent>,
    users: WriteSummary,
    time: WriteSummary,
}

pub struct Pipeline<'a> {
    session: &'a Session,
    locations: Locations,
    options: PipelineOptions,
    writer: PartitionedWriter<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(session: &'a Session, locations: Locations, options: PipelineOptions) -> Self {
        Pipeline {
            session,
            locations,
            options,
            writer: PartitionedWriter::new(session.storage(), options.compression),
        }
    }

    pub fn run(&self) -> Result<RunSummary> {
        self.session.check_locations(&self.locations)?;
        let started = Instant::now();
        info!(
            "Starting {} run: songs from {}, logs from {}, output to {}",
            self.session.mode(),
            self.locations.input_song_data,
            self.locations.input_log_data,
            self.locations.output_data
        );

        let song_stage = self.process_song_data()?;
        let log_stage = self.process_log_data()?;
        let (songplays, matched_songplays) =
            self.process_songplays(&song_stage.records, &log_stage.events)?;

        info!("Run finished in {:.2?}", started.elapsed());
        Ok(RunSummary {
            songs: song_stage.songs,
            artists: song_stage.artists,
            users: log_stage.users,
            time: log_stage.time,
            songplays,
            matched_songplays,
        })
    }

    fn destination<T: Table>(&self) -> String {
        join_location(&self.locations.output_data, T::DATASET)
    }

    fn write<T: Table>(&self, rows: &[T]) -> Result<WriteSummary> {
        self.writer.write_table(rows, &self.destination::<T>())
    }

    fn process_song_data(&self) -> Result<SongStage> {
        let records: Vec<SongRecord> =
            read_records(self.session.storage(), &self.locations.input_song_data)?;

        let songs = extract_songs(&records);
        let artists = extract_artists(&records, self.options.dedup);
        info!("Extracted {} songs and {} artists", songs.len(), artists.len());

        Ok(SongStage {
            songs: self.write(&songs)?,
            artists: self.write(&artists)?,
            records,
        })
    }

    fn process_log_data(&self) -> Result<LogStage> {
        let records: Vec<LogRecord> =
            read_records(self.session.storage(), &self.locations.input_log_data)?;
        let total = records.len();

        let plays = filter_plays(records);
        info!("Kept {} play events out of {} log records", plays.len(), total);
        let events = derive_play_events(plays, self.options.bad_timestamps)?;

        let users = extract_users(&events, self.options.dedup);
        let time = extract_time(&events);
        info!("Extracted {} users and {} time rows", users.len(), time.len());

        Ok(LogStage {
            users: self.write(&users)?,
            time: self.write(&time)?,
            events,
        })
    }

    fn process_songplays(
        &self,
        songs: &[SongRecord],
        events: &[PlayEvent],
    ) -> Result<(WriteSummary, usize)> {
        let catalog = SongCatalog::build(songs);
        let build = build_songplays(events, &catalog);
        info!(
            "Matched {} of {} plays against {} catalog songs",
            build.matched,
            build.rows.len(),
            catalog.len()
        );

        Ok((self.write(&build.rows)?, build.matched))
    }
}
