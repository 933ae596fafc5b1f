//! Background images read from the local filesystem.

use super::{BgProvider, BgSink, ProviderError};
use crate::core::{BgImage, PLACEHOLDER_MIME};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Picks random files from a directory, or always the same file when the
/// configured path is a file.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    path: PathBuf,
}

impl LocalProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists the candidate files.
    ///
    /// # Errors
    /// `ProviderError::NoLocalFiles` if the path is missing or the directory
    /// holds no regular file.
    pub async fn files(&self) -> Result<Vec<PathBuf>, ProviderError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|_| ProviderError::NoLocalFiles(self.path.clone()))?;
        if metadata.is_file() {
            return Ok(vec![self.path.clone()]);
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        if files.is_empty() {
            return Err(ProviderError::NoLocalFiles(self.path.clone()));
        }
        Ok(files)
    }

    /// Reads one randomly chosen file.
    pub async fn pick(&self) -> Result<BgImage, ProviderError> {
        let files = self.files().await?;
        let file = files
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| ProviderError::NoLocalFiles(self.path.clone()))?;
        debug!(file = %file.display(), "Picked local background file");
        let data = tokio::fs::read(&file).await?;
        Ok(BgImage::bytes(data, guess_mime(&file)))
    }
}

#[async_trait]
impl BgProvider for LocalProvider {
    async fn provide(&self, count: usize, sink: BgSink) -> Result<(), ProviderError> {
        for _ in 0..count {
            let image = self.pick().await?;
            if !sink.push(image).await {
                break;
            }
        }
        Ok(())
    }
}

/// Guesses an image MIME type from the file extension.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        Some("avif") => "image/avif",
        _ => PLACEHOLDER_MIME,
    }
}
