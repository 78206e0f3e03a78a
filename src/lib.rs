//! # Playlake - Song Play Star Schema ETL
//!
//! Turns a music streaming service's raw song catalog and user activity logs
//! into a star schema of Parquet datasets: the `songplays` fact table plus the
//! `songs`, `artists`, `users` and `time` dimensions.
//!
//! ## Modules
//!
//! - **reader**: resolve directories, globs and object-store prefixes into typed records
//! - **star**: dimension extraction, timestamp derivation and the songplays join
//! - **writer**: partitioned Parquet output with full dataset replacement
//! - **storage**: local filesystem and S3-compatible backends
//! - **config** / **session**: run configuration and the storage session it builds
//! - **pipeline**: sequences everything into one run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use playlake::{EtlConfig, Locations, Pipeline, PipelineOptions, Session};
//!
//! # fn main() -> playlake::Result<()> {
//! let session = Session::local();
//! let locations = Locations {
//!     input_song_data: "data/song_data".to_string(),
//!     input_log_data: "data/log_data".to_string(),
//!     output_data: "output".to_string(),
//! };
//!
//! let summary = Pipeline::new(&session, locations, PipelineOptions::default()).run()?;
//! println!("{} songplays, {} matched", summary.songplays.rows, summary.matched_songplays);
//!
//! // Or drive a run from an etl.toml
//! let config = EtlConfig::from_file("etl.toml")?;
//! playlake::run(&config, config.mode)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod reader;
pub mod records;
pub mod session;
pub mod star;
pub mod storage;
pub mod writer;

// Re-export commonly used types for convenience
pub use config::{EtlConfig, Locations, PipelineOptions, RunMode};
pub use error::{EtlError, Result};
pub use pipeline::{Pipeline, RunSummary};
pub use records::{LogRecord, SongRecord};
pub use session::Session;
pub use star::{DedupPolicy, Table, TimestampPolicy};
pub use writer::{ParquetCompression, PartitionedWriter, WriteSummary};

/// Main entry point: run the pipeline for `mode` as configured
pub fn run(config: &EtlConfig, mode: RunMode) -> Result<RunSummary> {
    let locations = config.locations(mode)?;
    let session = Session::connect(config, mode)?;
    Pipeline::new(&session, locations, config.pipeline).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_run_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let songs = dir.path().join("song_data");
        let logs = dir.path().join("log_data");
        fs::create_dir_all(&songs).unwrap();
        fs::create_dir_all(&logs).unwrap();
        fs::write(
            songs.join("TR1.json"),
            r#"{"song_id":"S1","title":"Test Song","artist_id":"A1","artist_name":"Test Artist","year":2000,"duration":180.0}"#,
        )
        .unwrap();
        fs::write(
            logs.join("events.json"),
            r#"{"artist":"Test Artist","song":"Test Song","page":"NextSong","ts":1000000000000,"userId":"1","level":"free"}"#,
        )
        .unwrap();

        let config = EtlConfig::from_toml_str(&format!(
            "[local]\ninput_song_data = {:?}\ninput_log_data = {:?}\noutput_data = {:?}\n",
            songs.display().to_string(),
            logs.display().to_string(),
            dir.path().join("out").display().to_string(),
        ))
        .unwrap();

        let summary = run(&config, RunMode::Local).unwrap();
        assert_eq!(summary.songplays.rows, 1);
        assert_eq!(summary.matched_songplays, 1);
    }

    #[test]
    fn test_run_without_section_fails() {
        let err = run(&EtlConfig::default(), RunMode::Local).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
