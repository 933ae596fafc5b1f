//! Point-in-time snapshots handed to renderers.

use crate::collectors::{CollectorFailure, CollectorRegistry};
use crate::core::{BgImage, CollectorValue};
use crate::preloader::BgPreloader;
use chrono::{DateTime, Local};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Every enabled collector's value plus one background image.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: DateTime<Local>,
    pub data: BTreeMap<String, CollectorValue>,
    pub background: BgImage,
}

impl Snapshot {
    /// A JSON summary of the snapshot. The background is described by its
    /// MIME type and size rather than embedded.
    pub fn to_json(&self) -> CollectorValue {
        json!({
            "taken_at": self.taken_at.to_rfc3339(),
            "data": self.data,
            "background": {
                "mime": self.background.mime(),
                "size": self.background.data().map(<[u8]>::len),
                "placeholder": self.background.is_placeholder(),
            },
        })
    }
}

/// Fans out one request to every enabled collector and the preloader.
#[derive(Clone)]
pub struct SnapshotAggregator {
    collectors: Arc<CollectorRegistry>,
    preloader: BgPreloader,
}

impl SnapshotAggregator {
    pub fn new(collectors: Arc<CollectorRegistry>, preloader: BgPreloader) -> Self {
        Self {
            collectors,
            preloader,
        }
    }

    /// Takes a snapshot.
    ///
    /// # Errors
    /// Fails when a Normal or FirstTime collector fails. The background
    /// image is never the cause.
    pub async fn snapshot(&self) -> Result<Snapshot, CollectorFailure> {
        let (data, background) = tokio::join!(self.collectors.collect_all(), self.preloader.get());
        let snapshot = Snapshot {
            taken_at: Local::now(),
            data: data?,
            background,
        };
        debug!(
            collectors = snapshot.data.len(),
            background = snapshot.background.mime(),
            "Snapshot taken"
        );
        Ok(snapshot)
    }

    pub fn collectors(&self) -> &Arc<CollectorRegistry> {
        &self.collectors
    }

    pub fn preloader(&self) -> &BgPreloader {
        &self.preloader
    }
}
