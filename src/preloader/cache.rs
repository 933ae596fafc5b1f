//! Process-scoped disk cache for preloaded background images.
//!
//! The directory is purged when the cache is opened. Every stored image gets
//! its own uniquely named file, which is deleted right after it is read back.
//!
//! # File Layout
//!
//! ```text
//! {cache_dir}/{unix_micros}-{sequence}.{ext}
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by the cache directory.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to write cache file `{}`: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read cache file `{}`: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to purge cache directory `{}`: {source}", .path.display())]
    Purge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A directory of single-use cache files.
#[derive(Debug)]
pub struct CacheDir {
    directory: PathBuf,
    sequence: AtomicU64,
}

impl CacheDir {
    /// Opens the cache at `directory`, deleting anything left from a previous run.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        let purge_err = |source| CacheError::Purge {
            path: directory.clone(),
            source,
        };

        match tokio::fs::remove_dir_all(&directory).await {
            Ok(()) => debug!(dir = %directory.display(), "Purged background cache"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(purge_err(e)),
        }
        tokio::fs::create_dir_all(&directory).await.map_err(purge_err)?;

        Ok(Self {
            directory,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.directory
    }

    /// Writes `data` to a new file and returns its path.
    pub async fn store(&self, data: &[u8], mime: &str) -> Result<PathBuf, CacheError> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}-{}.{}",
            chrono::Utc::now().timestamp_micros(),
            seq,
            extension_for(mime)
        );
        let path = self.directory.join(name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| CacheError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(file = %path.display(), size = data.len(), "Cached background image");
        Ok(path)
    }

    /// Reads a cache file back and deletes it.
    ///
    /// A failed delete is only logged; the bytes are still returned.
    pub async fn take(&self, path: &Path) -> Result<Vec<u8>, CacheError> {
        let data = tokio::fs::read(path).await.map_err(|source| CacheError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(file = %path.display(), error = %e, "Failed to delete consumed cache file");
        }
        Ok(data)
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime.split(';').next().unwrap_or_default().trim() {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_purges_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache");
        std::fs::create_dir(&cache_path).unwrap();
        std::fs::write(cache_path.join("stale.png"), b"old").unwrap();

        let cache = CacheDir::open(&cache_path).await.unwrap();
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_take_consumes_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::open(dir.path().join("cache")).await.unwrap();

        let path = cache.store(b"png", "image/png").await.unwrap();
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(cache.take(&path).await.unwrap(), b"png");
        assert!(!path.exists());
        assert!(matches!(cache.take(&path).await, Err(CacheError::Read { .. })));
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::open(dir.path()).await.unwrap();
        let a = cache.store(b"a", "image/jpeg; charset=binary").await.unwrap();
        let b = cache.store(b"b", "image/jpeg").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.extension().unwrap(), "jpg");
    }
}
