//! A token cache store backed by a single local file

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use rand::Rng;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use super::{CacheContents, CacheStore, MergeFn};
use crate::error::StoreError;

/// File name of the cache in the user's home directory
pub const DEFAULT_CACHE_FILE_NAME: &str = ".onedrive-cli.json";

/// A store that persists the serialized cache to a local file
///
/// Writes go to a sibling temporary file which is then renamed over the cache
/// file, so a reader never observes a truncated cache. Saves made through the
/// same store are serialized. Saves from separate processes are not
/// coordinated; the last writer wins.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCacheStore {
    /// Constructs a new file store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The default cache location in the invoking user's home directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_CACHE_FILE_NAME))
    }

    /// The path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_contents(&self) -> Result<CacheContents, StoreError> {
        let data = fs::read(&self.path).await?;
        tracing::trace!(path = %self.path.display(), len = data.len(), "read token cache file");
        Ok(CacheContents::new(data))
    }

    fn temp_path(&self) -> PathBuf {
        let suffix: u32 = rand::thread_rng().gen();
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CACHE_FILE_NAME.to_owned());
        self.path.with_file_name(format!(".{name}.{suffix:08x}.tmp"))
    }

    async fn replace_contents(&self, contents: &CacheContents) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let written = write_new_file(&temp, contents.as_bytes()).await;
        let result = match written {
            Ok(()) => fs::rename(&temp, &self.path).await,
            Err(err) => Err(err),
        };

        if result.is_err() {
            if let Err(error) = fs::remove_file(&temp).await {
                tracing::debug!(path = %temp.display(), %error, "unable to remove temporary cache file");
            }
        }

        result
    }
}

async fn write_new_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file_opts = fs::OpenOptions::new();

    file_opts.create_new(true).write(true);

    #[cfg(unix)]
    file_opts.mode(0o600);

    let mut file = file_opts.open(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn load(&self) -> Result<CacheContents, StoreError> {
        self.read_contents().await
    }

    async fn save(&self, merge: MergeFn) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let old = match self.read_contents().await {
            Ok(contents) => Some(contents),
            Err(StoreError::NotFound) => None,
            Err(err) => return Err(err),
        };

        let merged = merge(old);
        self.replace_contents(&merged).await.map_err(StoreError::Io)?;

        tracing::debug!(path = %self.path.display(), len = merged.as_bytes().len(), "persisted token cache file");
        Ok(())
    }
}
