#![allow(dead_code)]
//! Shared fixtures for the integration tests.

pub mod app;
pub mod mock_providers;
pub mod test_metrics;

use picstatus::preloader::{BgPreloader, CacheDir, PreloaderSettings};
use picstatus::providers::ProviderRegistry;
use picstatus::task_manager::TaskManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

/// Creates a directory holding `count` small files named `bg{i}.png`, each
/// containing `image-{i}`.
pub fn background_dir(count: usize) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..count {
        std::fs::write(dir.path().join(format!("bg{}.png", i)), format!("image-{}", i)).unwrap();
    }
    dir
}

/// Contents of the files written by [`background_dir`].
pub fn background_contents(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| format!("image-{}", i).into_bytes()).collect()
}

/// A preloader wired for a test, with its own cache directory.
pub struct TestPreloader {
    pub preloader: BgPreloader,
    pub tasks: TaskManager,
    pub cache_dir: PathBuf,
    _cache_root: TempDir,
    _shutdown_tx: watch::Sender<bool>,
}

impl TestPreloader {
    pub async fn new(
        providers: ProviderRegistry,
        provider: &str,
        preload_count: usize,
        fire_timeout: Duration,
    ) -> Self {
        let settings = PreloaderSettings {
            provider: provider.to_string(),
            preload_count,
            fire_timeout,
            refill_retry: Duration::from_millis(20),
        };
        Self::with_settings(providers, settings).await
    }

    pub async fn with_settings(providers: ProviderRegistry, settings: PreloaderSettings) -> Self {
        let cache_root = tempfile::tempdir().unwrap();
        let cache_dir = cache_root.path().join("bg-cache");
        let cache = CacheDir::open(&cache_dir).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = TaskManager::new(shutdown_rx);
        let preloader = BgPreloader::new(settings, Arc::new(providers), cache, tasks.clone());
        Self {
            preloader,
            tasks,
            cache_dir,
            _cache_root: cache_root,
            _shutdown_tx: shutdown_tx,
        }
    }

    /// Waits until the queue holds at least `len` entries and no refill runs.
    pub async fn wait_for_queue(&self, len: usize, timeout: Duration) {
        let start = tokio::time::Instant::now();
        while start.elapsed() < timeout {
            if self.preloader.queued() >= len && !self.preloader.is_refilling() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "queue did not reach {} entries (has {})",
            len,
            self.preloader.queued()
        );
    }

    /// Number of files currently in the cache directory.
    pub fn cache_files(&self) -> usize {
        std::fs::read_dir(&self.cache_dir).unwrap().count()
    }
}
