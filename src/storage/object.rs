use super::{DatasetFile, Location, Storage};
use anyhow::{anyhow, bail, Context, Result};
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Connection settings for an S3-compatible object store
#[derive(Clone, Default)]
pub struct S3Settings {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Storage on an S3-compatible object store
///
/// One store is built lazily per bucket. The pipeline is synchronous, so
/// every call blocks on an owned tokio runtime.
///
/// Replacing a dataset deletes the old objects before uploading the new
/// ones; a failure in between leaves the dataset partially written.
pub struct ObjectStorage {
    settings: S3Settings,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    runtime: tokio::runtime::Runtime,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets: Vec<String> = self
            .stores
            .lock()
            .map(|stores| stores.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ObjectStorage")
            .field("region", &self.settings.region)
            .field("endpoint", &self.settings.endpoint)
            .field("buckets", &buckets)
            .finish()
    }
}

impl ObjectStorage {
    pub fn new(settings: S3Settings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("playlake-io")
            .enable_all()
            .build()
            .context("Failed to start the object store runtime")?;

        Ok(ObjectStorage {
            settings,
            stores: Mutex::new(HashMap::new()),
            runtime,
        })
    }

    /// Serve `bucket` from an already built store instead of connecting to S3
    pub fn with_store(self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        if let Ok(mut stores) = self.stores.lock() {
            stores.insert(bucket.into(), store);
        }
        self
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| anyhow!("Object store cache lock poisoned"))?;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let store: Arc<dyn ObjectStore> = Arc::new(self.build_s3(bucket)?);
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    fn build_s3(&self, bucket: &str) -> Result<object_store::aws::AmazonS3> {
        let settings = &self.settings;
        let mut builder = match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(key), Some(secret)) => AmazonS3Builder::new()
                .with_access_key_id(key)
                .with_secret_access_key(secret),
            // Fall back to the standard AWS_* environment and instance credentials
            _ => AmazonS3Builder::from_env(),
        };
        builder = builder.with_bucket_name(bucket);
        if let Some(region) = &settings.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        debug!("Connecting to bucket {}", bucket);
        builder
            .build()
            .with_context(|| format!("Failed to configure object store for bucket {}", bucket))
    }

    fn resolve(&self, location: &str) -> Result<(String, Arc<dyn ObjectStore>, ObjectPath)> {
        match Location::parse(location)? {
            Location::Object { bucket, key } => {
                let store = self.store_for(&bucket)?;
                Ok((bucket, store, parse_key(&key)?))
            }
            Location::Local(_) => bail!("{} is a local path, not an object store location", location),
        }
    }

    fn list_objects(&self, store: &Arc<dyn ObjectStore>, prefix: &ObjectPath) -> Result<Vec<ObjectMeta>> {
        let prefix = if prefix.as_ref().is_empty() {
            None
        } else {
            Some(prefix)
        };
        self.runtime
            .block_on(store.list(prefix).try_collect::<Vec<ObjectMeta>>())
            .context("Failed to list objects")
    }
}

impl Storage for ObjectStorage {
    fn list_files(&self, location: &str) -> Result<Vec<String>> {
        let (bucket, store, prefix) = self.resolve(location)?;
        let scheme = location.split_once("://").map(|(s, _)| s).unwrap_or("s3");

        let mut objects = self.list_objects(&store, &prefix)?;
        if objects.is_empty() && !prefix.as_ref().is_empty() {
            // The location may name a single object rather than a prefix
            if let Ok(meta) = self.runtime.block_on(store.head(&prefix)) {
                objects.push(meta);
            }
        }
        if objects.is_empty() {
            bail!("No objects found under {}", location);
        }

        let mut files: Vec<String> = objects
            .into_iter()
            .map(|meta| format!("{}://{}/{}", scheme, bucket, meta.location))
            .collect();
        files.sort();
        Ok(files)
    }

    fn read(&self, location: &str) -> Result<Vec<u8>> {
        let (_, store, path) = self.resolve(location)?;
        let bytes = self
            .runtime
            .block_on(async { store.get(&path).await?.bytes().await })
            .with_context(|| format!("Failed to read {}", location))?;
        Ok(bytes.to_vec())
    }

    fn replace_dataset(&self, location: &str, files: Vec<DatasetFile>) -> Result<()> {
        let (_, store, prefix) = self.resolve(location)?;
        if prefix.as_ref().is_empty() {
            bail!("Refusing to replace the root of a bucket: {}", location);
        }

        let existing = self.list_objects(&store, &prefix)?;
        debug!(
            "Replacing {} objects under {} with {} files",
            existing.len(),
            location,
            files.len()
        );

        self.runtime.block_on(async {
            for meta in existing {
                store
                    .delete(&meta.location)
                    .await
                    .with_context(|| format!("Failed to delete {}", meta.location))?;
            }
            for file in files {
                let path = parse_key(&format!("{}/{}", prefix, file.relative_path))?;
                store
                    .put(&path, PutPayload::from(file.contents))
                    .await
                    .with_context(|| format!("Failed to upload {}", path))?;
            }
            Ok::<(), anyhow::Error>(())
        })
    }
}

/// Keys in locations and dataset files are already escaped, so they are
/// taken as-is rather than encoded a second time
fn parse_key(key: &str) -> Result<ObjectPath> {
    ObjectPath::parse(key).with_context(|| format!("Invalid object key {}", key))
}
