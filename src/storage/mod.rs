//! Read/write-by-path storage backends
//!
//! The pipeline only ever talks to a [`Storage`]: it lists and reads record
//! files, and hands finished datasets over for replacement. Which backend
//! serves a location is decided by its scheme.

pub mod local;
pub mod object;

pub use local::LocalStorage;
pub use object::ObjectStorage;

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

static OBJECT_URI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(s3|s3a|s3n)://([A-Za-z0-9][A-Za-z0-9.\-_]*)(?:/(.*))?$").unwrap()
});

static FILE_URI_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^file://(/.*)$").unwrap());

/// One file of a dataset, addressed relative to the dataset root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub relative_path: String,
    pub contents: Vec<u8>,
}

impl DatasetFile {
    pub fn new(relative_path: impl Into<String>, contents: Vec<u8>) -> Self {
        DatasetFile {
            relative_path: relative_path.into(),
            contents,
        }
    }
}

/// A storage backend exposing read/write-by-path operations
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// List every file below `location`, recursively, as full locations in
    /// lexicographic order. A location naming a single file lists that file.
    fn list_files(&self, location: &str) -> Result<Vec<String>>;

    /// Read a whole file
    fn read(&self, location: &str) -> Result<Vec<u8>>;

    /// Replace everything stored under `location` with `files`
    fn replace_dataset(&self, location: &str, files: Vec<DatasetFile>) -> Result<()>;
}

/// A parsed storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Object { bucket: String, key: String },
}

impl Location {
    pub fn parse(location: &str) -> Result<Self> {
        if let Some(caps) = OBJECT_URI_REGEX.captures(location) {
            let key = caps
                .get(3)
                .map(|m| m.as_str().trim_matches('/'))
                .unwrap_or_default();
            return Ok(Location::Object {
                bucket: caps[2].to_string(),
                key: key.to_string(),
            });
        }
        if let Some(caps) = FILE_URI_REGEX.captures(location) {
            return Ok(Location::Local(PathBuf::from(&caps[1])));
        }
        if location.contains("://") {
            bail!("Unsupported storage scheme in {}", location);
        }
        if location.is_empty() {
            bail!("Empty storage location");
        }
        Ok(Location::Local(PathBuf::from(location)))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Location::Object { .. })
    }
}

/// The form backends list files in: `file://` URIs become plain paths,
/// everything else is unchanged
pub fn canonical_location(location: &str) -> String {
    match FILE_URI_REGEX.captures(location) {
        Some(caps) => caps[1].to_string(),
        None => location.to_string(),
    }
}

/// Append a child name to a location, path-style
pub fn join_location(base: &str, child: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), child.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_uris() {
        assert_eq!(
            Location::parse("s3a://udacity-dend/song_data/").unwrap(),
            Location::Object {
                bucket: "udacity-dend".to_string(),
                key: "song_data".to_string(),
            }
        );
        assert_eq!(
            Location::parse("s3://bucket").unwrap(),
            Location::Object {
                bucket: "bucket".to_string(),
                key: String::new(),
            }
        );
    }

    #[test]
    fn test_parse_local_paths() {
        assert_eq!(
            Location::parse("data/log_data").unwrap(),
            Location::Local(PathBuf::from("data/log_data"))
        );
        assert_eq!(
            Location::parse("file:///tmp/out").unwrap(),
            Location::Local(PathBuf::from("/tmp/out"))
        );
        assert!(!Location::parse("/tmp/out").unwrap().is_object());
    }

    #[test]
    fn test_canonical_location() {
        assert_eq!(canonical_location("file:///tmp/out/*.json"), "/tmp/out/*.json");
        assert_eq!(canonical_location("/tmp/out"), "/tmp/out");
        assert_eq!(canonical_location("s3a://bucket/key"), "s3a://bucket/key");
    }

    #[test]
    fn test_parse_rejects_unknown_schemes() {
        assert!(Location::parse("gs://bucket/data").is_err());
        assert!(Location::parse("").is_err());
    }

    #[test]
    fn test_join_location() {
        assert_eq!(join_location("out/", "songs.parquet"), "out/songs.parquet");
        assert_eq!(
            join_location("s3a://bucket/sparkify", "time.parquet"),
            "s3a://bucket/sparkify/time.parquet"
        );
    }
}
