//! Output tables of the star schema and their Arrow representation

use arrow::array::{ArrayRef, Float64Array, Int32Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// A table that can be written as a partitioned dataset
pub trait Table: Sized + Send + Sync {
    /// Directory name of the dataset below the output root
    const DATASET: &'static str;

    /// Partition columns, outermost first
    const PARTITION_KEYS: &'static [&'static str];

    fn schema() -> SchemaRef;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError>;
}

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

fn micros(ts: &NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

fn strings<'a, T: 'a>(rows: &'a [T], get: impl Fn(&'a T) -> Option<&'a str>) -> ArrayRef {
    Arc::new(rows.iter().map(get).collect::<StringArray>())
}

/// Row of the songs dimension
#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub year: Option<i64>,
    pub duration: Option<f64>,
}

impl Table for SongRow {
    const DATASET: &'static str = "songs.parquet";
    const PARTITION_KEYS: &'static [&'static str] = &["year", "artist_id"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("song_id", DataType::Utf8, true),
            Field::new("title", DataType::Utf8, true),
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("year", DataType::Int64, true),
            Field::new("duration", DataType::Float64, true),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                strings(rows, |r| r.song_id.as_deref()),
                strings(rows, |r| r.title.as_deref()),
                strings(rows, |r| r.artist_id.as_deref()),
                Arc::new(rows.iter().map(|r| r.year).collect::<Int64Array>()),
                Arc::new(rows.iter().map(|r| r.duration).collect::<Float64Array>()),
            ],
        )
    }
}

/// Row of the artists dimension
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Table for ArtistRow {
    const DATASET: &'static str = "artists.parquet";
    const PARTITION_KEYS: &'static [&'static str] = &[];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("location", DataType::Utf8, true),
            Field::new("latitude", DataType::Float64, true),
            Field::new("longitude", DataType::Float64, true),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                strings(rows, |r| r.artist_id.as_deref()),
                strings(rows, |r| r.name.as_deref()),
                strings(rows, |r| r.location.as_deref()),
                Arc::new(rows.iter().map(|r| r.latitude).collect::<Float64Array>()),
                Arc::new(rows.iter().map(|r| r.longitude).collect::<Float64Array>()),
            ],
        )
    }
}

/// Row of the users dimension
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

impl Table for UserRow {
    const DATASET: &'static str = "users.parquet";
    const PARTITION_KEYS: &'static [&'static str] = &[];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("user_id", DataType::Utf8, true),
            Field::new("first_name", DataType::Utf8, true),
            Field::new("last_name", DataType::Utf8, true),
            Field::new("gender", DataType::Utf8, true),
            Field::new("level", DataType::Utf8, true),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                strings(rows, |r| r.user_id.as_deref()),
                strings(rows, |r| r.first_name.as_deref()),
                strings(rows, |r| r.last_name.as_deref()),
                strings(rows, |r| r.gender.as_deref()),
                strings(rows, |r| r.level.as_deref()),
            ],
        )
    }
}

/// Row of the time dimension
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRow {
    pub start_time: NaiveDateTime,
    pub hour: i32,
    pub day: i32,
    pub week: i32,
    pub month: i32,
    pub year: i32,
    pub weekday: i32,
}

impl Table for TimeRow {
    const DATASET: &'static str = "time.parquet";
    const PARTITION_KEYS: &'static [&'static str] = &["year", "month"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("start_time", timestamp_type(), false),
            Field::new("hour", DataType::Int32, false),
            Field::new("day", DataType::Int32, false),
            Field::new("week", DataType::Int32, false),
            Field::new("month", DataType::Int32, false),
            Field::new("year", DataType::Int32, false),
            Field::new("weekday", DataType::Int32, false),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        let ints = |get: fn(&TimeRow) -> i32| -> ArrayRef {
            Arc::new(Int32Array::from_iter_values(rows.iter().map(get)))
        };
        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(TimestampMicrosecondArray::from_iter_values(
                    rows.iter().map(|r| micros(&r.start_time)),
                )),
                ints(|r| r.hour),
                ints(|r| r.day),
                ints(|r| r.week),
                ints(|r| r.month),
                ints(|r| r.year),
                ints(|r| r.weekday),
            ],
        )
    }
}

/// Row of the songplays fact table
#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    pub songplay_id: i64,
    pub start_time: NaiveDateTime,
    pub user_id: Option<String>,
    pub level: Option<String>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub year: i32,
    pub month: i32,
}

impl Table for SongplayRow {
    const DATASET: &'static str = "songplays.parquet";
    const PARTITION_KEYS: &'static [&'static str] = &["year", "month"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("songplay_id", DataType::Int64, false),
            Field::new("start_time", timestamp_type(), false),
            Field::new("user_id", DataType::Utf8, true),
            Field::new("level", DataType::Utf8, true),
            Field::new("song_id", DataType::Utf8, true),
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("session_id", DataType::Int64, true),
            Field::new("location", DataType::Utf8, true),
            Field::new("user_agent", DataType::Utf8, true),
            Field::new("year", DataType::Int32, false),
            Field::new("month", DataType::Int32, false),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.songplay_id))),
                Arc::new(TimestampMicrosecondArray::from_iter_values(
                    rows.iter().map(|r| micros(&r.start_time)),
                )),
                strings(rows, |r| r.user_id.as_deref()),
                strings(rows, |r| r.level.as_deref()),
                strings(rows, |r| r.song_id.as_deref()),
                strings(rows, |r| r.artist_id.as_deref()),
                Arc::new(rows.iter().map(|r| r.session_id).collect::<Int64Array>()),
                strings(rows, |r| r.location.as_deref()),
                strings(rows, |r| r.user_agent.as_deref()),
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.month))),
            ],
        )
    }
}
