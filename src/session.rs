//! The storage session a pipeline run works against
//!
//! A session is built once from the configuration and passed explicitly to
//! the pipeline; nothing about the backend is global.

use crate::config::{EtlConfig, Locations, RunMode};
use crate::error::{EtlError, Result};
use crate::storage::{Location, LocalStorage, ObjectStorage, Storage};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Session {
    mode: RunMode,
    storage: Arc<dyn Storage>,
}

impl Session {
    /// Session over the local filesystem
    pub fn local() -> Self {
        Session {
            mode: RunMode::Local,
            storage: Arc::new(LocalStorage::new()),
        }
    }

    /// Session over an already built backend
    pub fn with_storage(mode: RunMode, storage: Arc<dyn Storage>) -> Self {
        Session { mode, storage }
    }

    /// Build the backend for `mode` from its configuration section
    pub fn connect(config: &EtlConfig, mode: RunMode) -> Result<Self> {
        match mode {
            RunMode::Local => Ok(Self::local()),
            RunMode::Remote => {
                let remote = config
                    .remote
                    .as_ref()
                    .ok_or_else(|| EtlError::Config("missing [remote] section".to_string()))?;
                let storage = ObjectStorage::new(remote.s3_settings())
                    .map_err(|e| EtlError::Config(format!("{e:#}")))?;
                info!("Connected object store session: {:?}", storage);
                Ok(Session {
                    mode,
                    storage: Arc::new(storage),
                })
            }
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Check that every location can be served by this session's backend
    pub fn check_locations(&self, locations: &Locations) -> Result<()> {
        for location in [
            &locations.input_song_data,
            &locations.input_log_data,
            &locations.output_data,
        ] {
            let parsed =
                Location::parse(location).map_err(|e| EtlError::Config(format!("{e:#}")))?;
            let expected_object = self.mode == RunMode::Remote;
            if parsed.is_object() != expected_object {
                return Err(EtlError::Config(format!(
                    "location {} cannot be used in {} mode",
                    location, self.mode
                )));
            }
        }
        Ok(())
    }
}
