use super::{DatasetFile, Location, Storage};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Storage on the local filesystem
///
/// Datasets are written into a hidden staging directory next to the
/// destination and swapped in with renames, so a failed write leaves the
/// previous dataset in place.
#[derive(Debug, Clone, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        LocalStorage
    }

    fn path_of(location: &str) -> Result<PathBuf> {
        match Location::parse(location)? {
            Location::Local(path) => Ok(path),
            Location::Object { .. } => {
                bail!("{} is an object store location, not a local path", location)
            }
        }
    }
}

impl Storage for LocalStorage {
    fn list_files(&self, location: &str) -> Result<Vec<String>> {
        let root = Self::path_of(location)?;
        let metadata = fs::metadata(&root)
            .with_context(|| format!("Cannot access {}", root.display()))?;

        if metadata.is_file() {
            return Ok(vec![root.display().to_string()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to list {}", root.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.path().display().to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    fn read(&self, location: &str) -> Result<Vec<u8>> {
        let path = Self::path_of(location)?;
        fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn replace_dataset(&self, location: &str, files: Vec<DatasetFile>) -> Result<()> {
        let target = Self::path_of(location)?;
        let Some(name) = target.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            bail!("Cannot replace dataset at {}", target.display());
        };
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;

        let staging = parent.join(format!(".{}.staging", name));
        let trash = parent.join(format!(".{}.trash", name));
        remove_any(&staging)?;

        if let Err(err) = stage_files(&staging, &files) {
            if let Err(cleanup) = remove_any(&staging) {
                warn!("{:#}", cleanup);
            }
            return Err(err);
        }
        debug!("Staged {} files in {}", files.len(), staging.display());

        swap_into_place(&staging, &target, &trash)
    }
}

fn stage_files(staging: &Path, files: &[DatasetFile]) -> Result<()> {
    fs::create_dir_all(staging)
        .with_context(|| format!("Failed to create directory {}", staging.display()))?;
    for file in files {
        let path = staging.join(&file.relative_path);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        fs::write(&path, &file.contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Move `staging` to `target`; if that fails the previous `target` is put back
fn swap_into_place(staging: &Path, target: &Path, trash: &Path) -> Result<()> {
    if !target.exists() {
        return fs::rename(staging, target)
            .with_context(|| format!("Failed to move staging into {}", target.display()));
    }

    remove_any(trash)?;
    fs::rename(target, trash)
        .with_context(|| format!("Failed to move {} out of the way", target.display()))?;

    if let Err(err) = fs::rename(staging, target) {
        if let Err(restore) = fs::rename(trash, target) {
            warn!(
                "Failed to restore {} from {}: {}",
                target.display(),
                trash.display(),
                restore
            );
        }
        return Err(err).with_context(|| format!("Failed to swap in {}", target.display()));
    }

    remove_any(trash)
}

fn remove_any(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove {}", path.display())),
        Ok(_) => fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display())),
        Err(_) => Ok(()),
    }
}
