//! Core domain types shared by the collector framework and the background
//! preloader.
//!
//! This module defines the values that flow out of the pipeline towards a
//! renderer: collector values and background images.

use std::path::PathBuf;

/// The value produced by a collector.
///
/// Collectors return heterogeneous data (strings, numbers, lists of structs),
/// so values are carried as JSON and typed again by whoever renders them.
pub type CollectorValue = serde_json::Value;

/// MIME type used when nothing better is known, and by the "no image"
/// placeholder.
pub const PLACEHOLDER_MIME: &str = "application/octet-stream";

/// A background image, either held in memory or persisted in the cache
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BgImage {
    /// Image bytes in memory. `data: None` is the "no image" terminal state.
    Bytes { data: Option<Vec<u8>>, mime: String },
    /// Image persisted to a cache file that is consumed exactly once.
    File { path: PathBuf, mime: String },
}

impl BgImage {
    /// Creates an in-memory image.
    pub fn bytes(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self::Bytes {
            data: Some(data),
            mime: mime.into(),
        }
    }

    /// The null-payload image returned when every source failed.
    pub fn placeholder() -> Self {
        Self::Bytes {
            data: None,
            mime: PLACEHOLDER_MIME.to_string(),
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            Self::Bytes { mime, .. } | Self::File { mime, .. } => mime,
        }
    }

    /// Returns the in-memory payload, if this is a `Bytes` image carrying one.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes { data, .. } => data.as_deref(),
            Self::File { .. } => None,
        }
    }

    /// Checks if this image is the null-payload placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Bytes { data: None, .. })
    }
}
