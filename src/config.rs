//! Run configuration loaded from a TOML file
//!
//! The file names one section per run mode. Only the section of the mode
//! being run has to exist, so a developer file can omit `[remote]` entirely.

use crate::error::{EtlError, Result};
use crate::star::{DedupPolicy, TimestampPolicy};
use crate::storage::object::S3Settings;
use crate::writer::ParquetCompression;
use anyhow::Context;
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";

/// Where a run reads from and writes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Local filesystem paths
    #[default]
    Local,
    /// S3-compatible object store URIs
    Remote,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Local => write!(f, "local"),
            RunMode::Remote => write!(f, "remote"),
        }
    }
}

/// Input and output locations of one run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Locations {
    pub input_song_data: String,
    pub input_log_data: String,
    pub output_data: String,
}

/// The `[remote]` section: locations plus object store connection settings
#[derive(Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(flatten)]
    pub locations: Locations,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl RemoteConfig {
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
        }
    }
}

fn redacted(secret: &Option<String>) -> &'static str {
    match secret {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("locations", &self.locations)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &redacted(&self.access_key_id))
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .finish()
    }
}

/// Transformation options shared by both modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub dedup: DedupPolicy,
    pub bad_timestamps: TimestampPolicy,
    pub compression: ParquetCompression,
}

/// Parsed configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub mode: RunMode,
    pub local: Option<Locations>,
    pub remote: Option<RemoteConfig>,
    pub pipeline: PipelineOptions,
}

impl EtlConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))
            .map_err(|e| EtlError::Config(format!("{e:#}")))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .context("Failed to parse config")
            .map_err(|e| EtlError::Config(format!("{e:#}")))
    }

    /// Locations of the section for `mode`
    pub fn locations(&self, mode: RunMode) -> Result<Locations> {
        let section = match mode {
            RunMode::Local => self.local.clone(),
            RunMode::Remote => self.remote.as_ref().map(|r| r.locations.clone()),
        };
        section.ok_or_else(|| EtlError::Config(format!("missing [{}] section", mode)))
    }

    /// Replace the locations of the `mode` section, creating it if needed
    pub fn set_locations(&mut self, mode: RunMode, locations: Locations) {
        match mode {
            RunMode::Local => self.local = Some(locations),
            RunMode::Remote => match &mut self.remote {
                Some(remote) => remote.locations = locations,
                None => {
                    self.remote = Some(RemoteConfig {
                        locations,
                        region: None,
                        endpoint: None,
                        access_key_id: None,
                        secret_access_key: None,
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
mode = "remote"

[local]
input_song_data = "data/song_data"
input_log_data = "data/log_data"
output_data = "output"

[remote]
input_song_data = "s3a://udacity-dend/song_data/*/*/*/*.json"
input_log_data = "s3a://udacity-dend/log_data/*/*/*.json"
output_data = "s3a://my-bucket/sparkify"
region = "us-west-2"
access_key_id = "AKIAEXAMPLE"
secret_access_key = "very-secret"

[pipeline]
dedup = "deduplicate"
bad_timestamps = "drop_row"
compression = "zstd"
"#;

    #[test]
    fn test_full_config() {
        let config = EtlConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.mode, RunMode::Remote);
        assert_eq!(config.pipeline.dedup, DedupPolicy::Deduplicate);
        assert_eq!(config.pipeline.bad_timestamps, TimestampPolicy::DropRow);
        assert_eq!(config.pipeline.compression, ParquetCompression::Zstd);

        let remote = config.locations(RunMode::Remote).unwrap();
        assert_eq!(remote.output_data, "s3a://my-bucket/sparkify");
        let local = config.locations(RunMode::Local).unwrap();
        assert_eq!(local.input_log_data, "data/log_data");

        let settings = config.remote.as_ref().unwrap().s3_settings();
        assert_eq!(settings.region.as_deref(), Some("us-west-2"));
        assert_eq!(settings.endpoint, None);
    }

    #[test]
    fn test_defaults() {
        let config = EtlConfig::from_toml_str(
            "[local]\ninput_song_data = \"a\"\ninput_log_data = \"b\"\noutput_data = \"c\"\n",
        )
        .unwrap();
        assert_eq!(config.mode, RunMode::Local);
        assert_eq!(config.pipeline, PipelineOptions::default());
        assert_eq!(config.pipeline.dedup, DedupPolicy::Preserve);
        assert_eq!(config.pipeline.bad_timestamps, TimestampPolicy::Abort);
        assert_eq!(config.pipeline.compression, ParquetCompression::Snappy);
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let config = EtlConfig::from_toml_str("mode = \"remote\"").unwrap();
        let err = config.locations(RunMode::Remote).unwrap_err();
        assert!(matches!(err, EtlError::Config(ref msg) if msg.contains("[remote]")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EtlConfig::from_toml_str("mode = \"cloud\""),
            Err(EtlError::Config(_))
        ));
        assert!(EtlConfig::from_toml_str("[pipeline]\ndedup = \"sometimes\"").is_err());
        assert!(EtlConfig::from_toml_str("[local]\ninput_song_data = \"a\"").is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = EtlConfig::from_toml_str(FULL).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("AKIAEXAMPLE"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("us-west-2"));
    }

    #[test]
    fn test_set_locations_creates_section() {
        let mut config = EtlConfig::default();
        let locations = Locations {
            input_song_data: "s3://b/songs".to_string(),
            input_log_data: "s3://b/logs".to_string(),
            output_data: "s3://b/out".to_string(),
        };
        config.set_locations(RunMode::Remote, locations.clone());
        assert_eq!(config.locations(RunMode::Remote).unwrap(), locations);
    }

    #[test]
    fn test_missing_file() {
        let err = EtlConfig::from_file("/definitely/not/here/etl.toml").unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
