//! # Cache Policy

use anyhow::{Context, bail};
use burn::config::Config;
use burn::data::network::downloader;
use std::fs::{File, remove_file, rename};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Cache Policy
#[derive(Config, Debug)]
pub struct DiskCacheConfig {
    /// Key for the root cache directory, under ``~/.cache``.
    #[config(default = "\"senet\".to_string()")]
    pub root_cache_key: String,

    /// Explicit root cache directory; replaces ``~/.cache/{root_cache_key}``.
    pub root_dir: Option<PathBuf>,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCacheConfig {
    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, does not create it.
    pub fn base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(root) = &self.root_dir {
            return Ok(root.clone());
        }
        Ok(dirs::home_dir()
            .context("Unable to determine the home directory")?
            .join(".cache")
            .join(&self.root_cache_key))
    }

    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, creates it.
    pub fn ensure_base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let dir = self.base_cache_dir()?;
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create cache dir: {}", dir.display()))?;
        }
        Ok(dir)
    }

    /// Map a resource key to a cache path.
    ///
    /// Does not ensure that the path (or any of the parents) exist.
    pub fn resource_to_path(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.base_cache_dir()?;
        Ok(resource_key.iter().fold(path, |acc, s| acc.join(s)))
    }

    /// Map a resource key to a cache path and ensure the parent directory exists.
    pub fn ensure_resource_parent_dir(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.resource_to_path(resource_key)?;
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(path)
    }

    /// Fetch a Resource to the Cache.
    pub fn fetch_resource(
        &self,
        url: &str,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let cache_file_path = self.ensure_resource_parent_dir(resource)?;
        try_cache_download_to_path(url, cache_file_path)
    }
}

/// Download a URL resource to a given path.
///
/// If the path already exists, does nothing.
///
/// # Returns
///
/// The cache path.
pub fn try_cache_download_to_path(
    url: &str,
    cache_file_path: PathBuf,
) -> anyhow::Result<PathBuf> {
    if cache_file_path.exists() {
        tracing::debug!(path = %cache_file_path.display(), "cache hit");
        return Ok(cache_file_path);
    }

    let file_name = match cache_file_path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => bail!("Invalid cache path: {}", cache_file_path.display()),
    };

    tracing::info!(url, path = %cache_file_path.display(), "cache miss; downloading");

    // TODO: download-to-file instead of download-to-memory.
    let bytes = downloader::download_file_as_bytes(url, &file_name);

    write_cache_file(&cache_file_path, &bytes)?;
    tracing::debug!(bytes = bytes.len(), "cached");

    Ok(cache_file_path)
}

/// The sibling ``{file_name}.partial`` path used while writing a cache file.
pub fn partial_cache_path(path: &Path) -> anyhow::Result<PathBuf> {
    match path.file_name() {
        Some(name) => Ok(path.with_file_name(format!("{}.partial", name.to_string_lossy()))),
        None => bail!("Invalid cache path: {}", path.display()),
    }
}

/// Write a cache file.
///
/// The bytes are written to [`partial_cache_path`], and renamed onto `path`
/// once complete; on any error the partial file is removed, and `path`
/// is left untouched.
pub fn write_cache_file(
    path: &Path,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let partial = partial_cache_path(path)?;

    let result = write_and_rename(&partial, path, bytes);
    if result.is_err() && partial.exists() {
        if let Err(err) = remove_file(&partial) {
            tracing::warn!(path = %partial.display(), %err, "failed to remove partial cache file");
        }
    }
    result.with_context(|| format!("Failed to write cache file: {}", path.display()))
}

fn write_and_rename(
    partial: &Path,
    path: &Path,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let mut output_file = File::create(partial)?;
    output_file.write_all(bytes)?;
    output_file.sync_all()?;
    drop(output_file);
    rename(partial, path)?;
    Ok(())
}
