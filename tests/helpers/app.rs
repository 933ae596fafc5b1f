//! Test helpers for running the full application instance.

use super::background_dir;
use anyhow::Result;
use async_trait::async_trait;
use picstatus::{
    app::{App, AppBuilder},
    collectors::{source_fn, CollectError, CollectorCatalog, DeltaSource},
    config::Config,
    core::CollectorValue,
    providers::ProviderRegistry,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::timeout;

/// Names of the collectors in [`test_catalog`].
pub const TEST_COLLECTORS: [&str; 4] = ["answer", "boot_id", "ticks", "tick_rate"];

/// Reports how far a shared counter moved per second.
pub struct CounterRate {
    counter: Arc<AtomicU64>,
}

#[async_trait]
impl DeltaSource for CounterRate {
    type Raw = u64;

    async fn sample(&self) -> Result<u64, CollectError> {
        Ok(self.counter.load(Ordering::SeqCst))
    }

    fn calc(&self, past: &u64, now: &u64, elapsed_secs: f64) -> Result<CollectorValue, CollectError> {
        Ok(json!((now - past) as f64 / elapsed_secs))
    }
}

/// A catalog with one collector of each kind and no system access.
pub fn test_catalog() -> CollectorCatalog {
    let ticks = Arc::new(AtomicU64::new(0));
    let tick_source = ticks.clone();
    let boot_id = Arc::new(AtomicU64::new(0));

    let mut catalog = CollectorCatalog::new();
    catalog
        .add_normal("answer", || source_fn(|| async { Ok(json!(42)) }))
        .unwrap()
        .add_first_time("boot_id", move || {
            let boot_id = boot_id.clone();
            source_fn(move || {
                let id = boot_id.fetch_add(1, Ordering::SeqCst);
                async move { Ok(json!(id)) }
            })
        })
        .unwrap()
        .add_periodic("ticks", move || {
            let ticks = tick_source.clone();
            source_fn(move || {
                let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(json!(n)) }
            })
        })
        .unwrap()
        .add_time_delta("tick_rate", move || CounterRate {
            counter: ticks.clone(),
        })
        .unwrap();
    catalog
}

/// Represents a running instance of the application for testing purposes.
pub struct TestApp {
    pub app: App,
    pub shutdown_tx: watch::Sender<bool>,
    _dirs: Vec<TempDir>,
}

impl TestApp {
    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true)?;
        timeout(timeout_duration, self.app.shutdown())
            .await
            .map_err(|_| anyhow::anyhow!("App failed to shut down within the timeout"))
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
pub struct TestAppBuilder {
    pub config: Config,
    catalog: Option<CollectorCatalog>,
    providers: Option<ProviderRegistry>,
    dirs: Vec<TempDir>,
}

impl TestAppBuilder {
    /// Local provider over three fixture files, the test catalog, and a
    /// private cache directory.
    pub fn new() -> Self {
        let backgrounds = background_dir(3);
        let cache_root = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.collectors.enabled = TEST_COLLECTORS.iter().map(|s| s.to_string()).collect();
        config.collectors.interval_seconds = 1;
        config.collectors.default_history_size = 5;
        config.background.provider = "local".to_string();
        config.background.preload_count = 2;
        config.background.local_path = backgrounds.path().to_path_buf();
        config.background.cache_dir = cache_root.path().join("bg-cache");
        config.background.fire_timeout_seconds = 2;

        Self {
            config,
            catalog: Some(test_catalog()),
            providers: None,
            dirs: vec![backgrounds, cache_root],
        }
    }

    /// Uses the builtin system collectors instead of the test catalog.
    pub fn with_builtin_collectors(mut self) -> Self {
        self.catalog = None;
        self
    }

    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut builder = AppBuilder::new(self.config);
        if let Some(catalog) = self.catalog {
            builder = builder.catalog_override(catalog);
        }
        if let Some(providers) = self.providers {
            builder = builder.providers_override(providers);
        }
        let app = builder.build(shutdown_rx).await?;
        Ok(TestApp {
            app,
            shutdown_tx,
            _dirs: self.dirs,
        })
    }
}
