//! Partitioned Parquet writer
//!
//! A table is encoded into one Parquet file per partition, laid out Hive
//! style (`year=2018/month=11/part-00000.parquet`), and handed to the storage
//! backend as a complete replacement for whatever the destination held.

use crate::error::{EtlError, Result};
use crate::star::Table;
use crate::storage::{DatasetFile, Storage};
use anyhow::Context;
use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::take;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Marker file written next to the data of every completed dataset
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Directory value used for null or empty partition values
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

const PART_FILE: &str = "part-00000.parquet";

/// Compression codec for the Parquet files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParquetCompression {
    #[default]
    Snappy,
    Zstd,
    Uncompressed,
}

impl ParquetCompression {
    fn codec(self) -> Compression {
        match self {
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

/// What a write produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub destination: String,
    pub rows: usize,
    /// Number of partition directories, 0 for an unpartitioned dataset
    pub partitions: usize,
    /// Number of Parquet files
    pub files: usize,
}

/// Writes tables as partitioned Parquet datasets, replacing previous output
pub struct PartitionedWriter<'a> {
    storage: &'a dyn Storage,
    properties: WriterProperties,
}

impl<'a> PartitionedWriter<'a> {
    pub fn new(storage: &'a dyn Storage, compression: ParquetCompression) -> Self {
        let properties = WriterProperties::builder()
            .set_compression(compression.codec())
            .build();
        PartitionedWriter { storage, properties }
    }

    /// Write typed rows using the table's own partition keys
    pub fn write_table<T: Table>(&self, rows: &[T], destination: &str) -> Result<WriteSummary> {
        let batch = T::to_record_batch(rows).map_err(|e| EtlError::write(destination, e))?;
        self.write(&batch, destination, T::PARTITION_KEYS)
    }

    /// Replace the dataset at `destination` with `batch`, partitioned by
    /// `partition_keys` in the given order
    pub fn write(
        &self,
        batch: &RecordBatch,
        destination: &str,
        partition_keys: &[&str],
    ) -> Result<WriteSummary> {
        let mut files = self
            .encode(batch, partition_keys)
            .map_err(|e| EtlError::write(destination, format!("{e:#}")))?;

        let summary = WriteSummary {
            destination: destination.to_string(),
            rows: batch.num_rows(),
            partitions: if partition_keys.is_empty() { 0 } else { files.len() },
            files: files.len(),
        };

        files.push(DatasetFile::new(SUCCESS_MARKER, Vec::new()));
        self.storage
            .replace_dataset(destination, files)
            .map_err(|e| EtlError::write(destination, format!("{e:#}")))?;

        info!(
            "Wrote {} rows to {} ({} files)",
            summary.rows, destination, summary.files
        );
        Ok(summary)
    }

    fn encode(&self, batch: &RecordBatch, partition_keys: &[&str]) -> anyhow::Result<Vec<DatasetFile>> {
        let schema = batch.schema();
        let key_columns: Vec<usize> = partition_keys
            .iter()
            .map(|key| {
                schema
                    .index_of(key)
                    .with_context(|| format!("Unknown partition column {}", key))
            })
            .collect::<anyhow::Result<_>>()?;

        if key_columns.is_empty() {
            let contents = encode_parquet(batch, &self.properties)?;
            return Ok(vec![DatasetFile::new(PART_FILE, contents)]);
        }

        let groups = group_rows(batch, partition_keys, &key_columns)?;
        debug!("Split {} rows into {} partitions", batch.num_rows(), groups.len());

        let data_columns: Vec<usize> = (0..schema.fields().len())
            .filter(|idx| !key_columns.contains(idx))
            .collect();
        let data_schema = Arc::new(schema.project(&data_columns)?);

        groups
            .into_par_iter()
            .map(|(dir, rows)| -> anyhow::Result<DatasetFile> {
                let indices = UInt32Array::from(rows);
                let columns = data_columns
                    .iter()
                    .map(|&idx| take(batch.column(idx).as_ref(), &indices, None))
                    .collect::<std::result::Result<Vec<ArrayRef>, ArrowError>>()?;
                let part = RecordBatch::try_new(data_schema.clone(), columns)?;
                let contents = encode_parquet(&part, &self.properties)
                    .with_context(|| format!("Failed to encode partition {}", dir))?;
                Ok(DatasetFile::new(format!("{}/{}", dir, PART_FILE), contents))
            })
            .collect()
    }
}

/// Group row indices by their partition directory, keeping row order
fn group_rows(
    batch: &RecordBatch,
    partition_keys: &[&str],
    key_columns: &[usize],
) -> anyhow::Result<Vec<(String, Vec<u32>)>> {
    let options = FormatOptions::default();
    let formatters = key_columns
        .iter()
        .map(|&idx| ArrayFormatter::try_new(batch.column(idx).as_ref(), &options))
        .collect::<std::result::Result<Vec<_>, ArrowError>>()?;

    let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let mut dir = String::new();
        for ((key, &idx), formatter) in partition_keys.iter().zip(key_columns).zip(&formatters) {
            if !dir.is_empty() {
                dir.push('/');
            }
            let value = if batch.column(idx).is_null(row) {
                DEFAULT_PARTITION.to_string()
            } else {
                escape_partition_value(&formatter.value(row).to_string())
            };
            dir.push_str(key);
            dir.push('=');
            dir.push_str(&value);
        }
        groups.entry(dir).or_default().push(row_index(row)?);
    }

    Ok(groups.into_iter().collect())
}

/// Row position as the index type of `take`
fn row_index(row: usize) -> anyhow::Result<u32> {
    u32::try_from(row).with_context(|| format!("Row {} exceeds the partitionable batch size", row))
}

/// Percent-escape characters that cannot appear in a partition directory
fn escape_partition_value(value: &str) -> String {
    if value.is_empty() {
        return DEFAULT_PARTITION.to_string();
    }

    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        let needs_escape = c.is_ascii_control()
            || matches!(
                c,
                '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
            );
        if needs_escape {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn encode_parquet(batch: &RecordBatch, properties: &WriterProperties) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties.clone()))
        .context("Failed to create Parquet writer")?;
    writer.write(batch).context("Failed to write batch")?;
    writer.close().context("Failed to close Parquet writer")?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::star::{SongRow, TimeRow, UserRow};
    use crate::storage::LocalStorage;
    use chrono::NaiveDate;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;
    use std::path::Path;

    fn read_parquet(path: &Path) -> Vec<RecordBatch> {
        ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .build()
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    fn rows_in(path: &Path) -> usize {
        read_parquet(path).iter().map(|b| b.num_rows()).sum()
    }

    fn time_row(year: i32, month: i32, day: u32) -> TimeRow {
        let start_time = NaiveDate::from_ymd_opt(year, month as u32, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        TimeRow {
            start_time,
            hour: 12,
            day: 1,
            week: 1,
            month,
            year,
            weekday: 1,
        }
    }

    fn song(song_id: &str, artist_id: Option<&str>, year: i64) -> SongRow {
        SongRow {
            song_id: Some(song_id.to_string()),
            title: Some("t".to_string()),
            artist_id: artist_id.map(str::to_string),
            year: Some(year),
            duration: Some(1.0),
        }
    }

    #[test]
    fn test_unpartitioned_table_is_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let writer = PartitionedWriter::new(&storage, ParquetCompression::default());
        let destination = dir.path().join("users.parquet");

        let users = vec![
            UserRow {
                user_id: Some("1".to_string()),
                first_name: Some("Ann".to_string()),
                last_name: None,
                gender: Some("F".to_string()),
                level: Some("free".to_string()),
            };
            3
        ];
        let summary = writer
            .write_table(&users, &destination.display().to_string())
            .unwrap();

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.partitions, 0);
        assert_eq!(summary.files, 1);
        assert!(destination.join(SUCCESS_MARKER).exists());
        assert_eq!(rows_in(&destination.join(PART_FILE)), 3);
    }

    #[test]
    fn test_partition_directories_and_columns() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let writer = PartitionedWriter::new(&storage, ParquetCompression::Zstd);
        let destination = dir.path().join("time.parquet");

        let rows = vec![time_row(2018, 11, 1), time_row(2001, 9, 9), time_row(2018, 11, 2)];
        let summary = writer
            .write_table(&rows, &destination.display().to_string())
            .unwrap();

        assert_eq!(summary.partitions, 2);
        let nov = destination.join("year=2018/month=11").join(PART_FILE);
        let sep = destination.join("year=2001/month=9").join(PART_FILE);
        assert_eq!(rows_in(&nov), 2);
        assert_eq!(rows_in(&sep), 1);

        let batch = &read_parquet(&nov)[0];
        let names: Vec<_> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["start_time", "hour", "day", "week", "weekday"]);
    }

    #[test]
    fn test_null_and_special_partition_values() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let writer = PartitionedWriter::new(&storage, ParquetCompression::default());
        let destination = dir.path().join("songs.parquet");

        let rows = vec![song("S1", None, 0), song("S2", Some("AR/1:x"), 2000)];
        writer
            .write_table(&rows, &destination.display().to_string())
            .unwrap();

        assert!(destination
            .join(format!("year=0/artist_id={}", DEFAULT_PARTITION))
            .join(PART_FILE)
            .exists());
        assert!(destination
            .join("year=2000/artist_id=AR%2F1%3Ax")
            .join(PART_FILE)
            .exists());
    }

    #[test]
    fn test_rewrite_replaces_previous_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let writer = PartitionedWriter::new(&storage, ParquetCompression::default());
        let destination = dir.path().join("time.parquet");
        let location = destination.display().to_string();

        writer.write_table(&[time_row(2017, 1, 1)], &location).unwrap();
        writer.write_table(&[time_row(2018, 11, 1)], &location).unwrap();

        assert!(!destination.join("year=2017").exists());
        assert!(destination.join("year=2018/month=11").exists());
    }

    #[test]
    fn test_unknown_partition_key_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let writer = PartitionedWriter::new(&storage, ParquetCompression::default());
        let batch = TimeRow::to_record_batch(&[time_row(2018, 11, 1)]).unwrap();

        let err = writer
            .write(&batch, &dir.path().join("x").display().to_string(), &["decade"])
            .unwrap_err();
        assert!(matches!(err, EtlError::Write { .. }));
    }

    #[test]
    fn test_unwritable_destination_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let writer = PartitionedWriter::new(&storage, ParquetCompression::default());

        let previous = dir.path().join("time.parquet");
        writer
            .write_table(&[time_row(2018, 11, 1)], &previous.display().to_string())
            .unwrap();

        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let err = writer
            .write_table(
                &[time_row(2018, 11, 2)],
                &blocker.join("time.parquet").display().to_string(),
            )
            .unwrap_err();

        match err {
            EtlError::Write { destination, .. } => assert!(destination.ends_with("time.parquet")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rows_in(&previous.join("year=2018/month=11").join(PART_FILE)), 1);
    }

    #[test]
    fn test_row_index_past_u32_fails() {
        assert_eq!(row_index(7).unwrap(), 7);
        assert!(row_index(u32::MAX as usize).is_ok());
        #[cfg(target_pointer_width = "64")]
        assert!(row_index(u32::MAX as usize + 1).is_err());
    }

    #[test]
    fn test_empty_partitioned_table_writes_marker_only() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new();
        let writer = PartitionedWriter::new(&storage, ParquetCompression::default());
        let destination = dir.path().join("time.parquet");

        let summary = writer
            .write_table::<TimeRow>(&[], &destination.display().to_string())
            .unwrap();
        assert_eq!(summary.files, 0);
        assert!(destination.join(SUCCESS_MARKER).exists());
    }

    #[test]
    fn test_escape_partition_value() {
        assert_eq!(escape_partition_value("2018"), "2018");
        assert_eq!(escape_partition_value("a=b"), "a%3Db");
        assert_eq!(escape_partition_value("50%"), "50%25");
        assert_eq!(escape_partition_value(""), DEFAULT_PARTITION);
        assert_eq!(escape_partition_value("Zoé"), "Zoé");
    }
}
