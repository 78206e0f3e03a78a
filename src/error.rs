//! Error taxonomy for the ETL run.
//!
//! Plumbing (storage backends, config loading) works with `anyhow` and is
//! folded into one of these variants at component boundaries, so callers only
//! have to match on what went wrong, not on which crate reported it.

use thiserror::Error;

/// Fatal errors of a pipeline run
#[derive(Error, Debug)]
pub enum EtlError {
    /// A record source could not be listed, read or parsed
    #[error("failed to read source {location}: {reason}")]
    SourceRead { location: String, reason: String },

    /// A `ts` value could not be turned into a timestamp
    #[error("cannot convert ts value {value} to a timestamp: {reason}")]
    TimestampConversion { value: String, reason: String },

    /// A dataset could not be written to its destination
    #[error("failed to write dataset {destination}: {reason}")]
    Write { destination: String, reason: String },

    /// Missing or invalid configuration, or a session that could not be built
    #[error("configuration error: {0}")]
    Config(String),
}

impl EtlError {
    pub fn source_read(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        EtlError::SourceRead {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(destination: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        EtlError::Write {
            destination: destination.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience Result type using [`EtlError`]
pub type Result<T> = std::result::Result<T, EtlError>;
