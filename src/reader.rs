//! Record source reader
//!
//! Resolves a location (directory, single file or glob) into record files and
//! parses them into typed records. A file may hold one JSON object, a JSON
//! array of objects, or newline-delimited JSON.

use crate::error::{EtlError, Result};
use crate::storage::{canonical_location, Storage};
use rayon::prelude::*;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::marker::PhantomData;
use tracing::{debug, info};

/// File extensions that hold records when a whole directory is read
const RECORD_EXTENSIONS: [&str; 3] = [".json", ".jsonl", ".ndjson"];

/// A re-readable source of records of type `T`
pub struct RecordSource<'a, T> {
    storage: &'a dyn Storage,
    location: String,
    files: Vec<String>,
    _records: PhantomData<T>,
}

impl<'a, T> std::fmt::Debug for RecordSource<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSource")
            .field("location", &self.location)
            .field("files", &self.files.len())
            .finish()
    }
}

impl<'a, T> RecordSource<'a, T>
where
    T: DeserializeOwned + Send,
{
    /// Resolve `location` into the list of files to read
    pub fn open(storage: &'a dyn Storage, location: &str) -> Result<Self> {
        let canonical = canonical_location(location);
        let (base, pattern) = split_glob(&canonical)
            .map_err(|e| EtlError::source_read(location, format!("invalid pattern: {e}")))?;

        let listed = storage
            .list_files(&base)
            .map_err(|e| EtlError::source_read(location, format!("{e:#}")))?;

        let files: Vec<String> = match &pattern {
            Some(regex) => listed.into_iter().filter(|f| regex.is_match(f)).collect(),
            None if listed.len() == 1 && listed[0] == base => listed,
            None => listed.into_iter().filter(|f| is_record_file(f)).collect(),
        };

        if files.is_empty() {
            return Err(EtlError::source_read(location, "no record files found"));
        }
        debug!("Resolved {} to {} files", location, files.len());

        Ok(RecordSource {
            storage,
            location: location.to_string(),
            files,
            _records: PhantomData,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Read and parse every file, in file order
    pub fn read_all(&self) -> Result<Vec<T>> {
        let per_file: Vec<Vec<T>> = self
            .files
            .par_iter()
            .map(|file| -> Result<Vec<T>> {
                let content = self
                    .storage
                    .read(file)
                    .map_err(|e| EtlError::source_read(file.as_str(), format!("{e:#}")))?;
                parse_records(&content).map_err(|reason| EtlError::source_read(file.as_str(), reason))
            })
            .collect::<Result<_>>()?;

        let records: Vec<T> = per_file.into_iter().flatten().collect();
        if records.is_empty() {
            return Err(EtlError::source_read(&self.location, "no records found"));
        }

        info!(
            "Read {} records from {} files under {}",
            records.len(),
            self.files.len(),
            self.location
        );
        Ok(records)
    }
}

/// Convenience for `RecordSource::open(..)?.read_all()`
pub fn read_records<T>(storage: &dyn Storage, location: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned + Send,
{
    RecordSource::<T>::open(storage, location)?.read_all()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Parse the records of one file
///
/// Lines are parsed one by one with SIMD parsing first, which covers both
/// line-delimited logs and one-object-per-file catalogs. A file that is not
/// line-delimited (a pretty-printed object, an array) is parsed as a single
/// document instead. Content must be valid UTF-8.
fn parse_records<T: DeserializeOwned>(content: &[u8]) -> std::result::Result<Vec<T>, String> {
    let text = std::str::from_utf8(content).map_err(|e| format!("invalid UTF-8: {e}"))?;
    match parse_lines(text) {
        Ok(records) => Ok(records),
        Err(line_error) => match serde_json::from_str::<OneOrMany<T>>(text) {
            Ok(OneOrMany::Many(records)) => Ok(records),
            Ok(OneOrMany::One(record)) => Ok(vec![record]),
            Err(_) => Err(line_error),
        },
    }
}

fn parse_lines<T: DeserializeOwned>(text: &str) -> std::result::Result<Vec<T>, String> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut buf = line.as_bytes().to_vec();
        let record: T = simd_json::serde::from_slice(&mut buf)
            .map_err(|e| format!("malformed record on line {}: {}", idx + 1, e))?;
        records.push(record);
    }
    Ok(records)
}

fn is_record_file(location: &str) -> bool {
    RECORD_EXTENSIONS.iter().any(|ext| location.ends_with(ext))
}

fn is_wildcard(c: char) -> bool {
    c == '*' || c == '?'
}

/// Split a location at its first wildcard segment
///
/// `data/song_data/*/*/*/*.json` lists `data/song_data` and keeps the files
/// matching the whole pattern.
fn split_glob(location: &str) -> std::result::Result<(String, Option<Regex>), regex::Error> {
    if !location.contains(is_wildcard) {
        return Ok((location.to_string(), None));
    }

    let segments: Vec<&str> = location.split('/').collect();
    let first_wild = segments
        .iter()
        .position(|s| s.contains(is_wildcard))
        .unwrap_or(segments.len());
    let base = segments[..first_wild].join("/");

    Ok((base, Some(glob_to_regex(location)?)))
}

fn glob_to_regex(glob: &str) -> std::result::Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            c => pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}
