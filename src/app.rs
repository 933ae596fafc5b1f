//! The main application logic, decoupled from the entry point.

use crate::{
    collectors::{builtin::register_builtin, CollectorCatalog, CollectorFailure, CollectorRegistry, HistorySettings},
    config::Config,
    internal_metrics::Metrics,
    preloader::{BgPreloader, CacheDir, PreloaderSettings},
    providers::ProviderRegistry,
    scheduler::run_scheduler,
    snapshot::{Snapshot, SnapshotAggregator},
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// A handle to the running application.
pub struct App {
    config: Config,
    task_manager: TaskManager,
    aggregator: SnapshotAggregator,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collectors(&self) -> &Arc<CollectorRegistry> {
        self.aggregator.collectors()
    }

    pub fn preloader(&self) -> &BgPreloader {
        self.aggregator.preloader()
    }

    /// Takes a snapshot of every enabled collector plus one background.
    pub async fn snapshot(&self) -> Result<Snapshot, CollectorFailure> {
        self.aggregator.snapshot().await
    }

    /// Runs one periodic collection round outside the scheduler.
    pub async fn collect_periodic_now(&self) {
        self.aggregator.collectors().collect_periodic().await;
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.changed().await.ok();
        info!("Shutdown signal received. Waiting for tasks to complete...");
        self.shutdown().await;
        Ok(())
    }

    /// Aborts pending background fetches and awaits the service tasks.
    ///
    /// Service tasks only exit once the shutdown signal has been sent.
    pub async fn shutdown(self) {
        self.task_manager.shutdown().await;
        info!("All tasks shut down.");
    }
}

/// Builder for the main application.
///
/// This pattern allows for a clean separation of concerns between constructing
/// the application's components and running the application. It also provides
/// a convenient way to override components for testing purposes.
pub struct AppBuilder {
    config: Config,
    catalog_override: Option<CollectorCatalog>,
    providers_override: Option<ProviderRegistry>,
    skip_warmup: bool,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            catalog_override: None,
            providers_override: None,
            skip_warmup: false,
        }
    }

    /// Overrides the collector catalog. Builtin collectors are not registered.
    pub fn catalog_override(mut self, catalog: CollectorCatalog) -> Self {
        self.catalog_override = Some(catalog);
        self
    }

    /// Overrides the provider registry.
    pub fn providers_override(mut self, providers: ProviderRegistry) -> Self {
        self.providers_override = Some(providers);
        self
    }

    /// Skips warming up FirstTime collectors during the build.
    pub fn skip_warmup(mut self, skip: bool) -> Self {
        self.skip_warmup = skip;
        self
    }

    /// Builds and initializes all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Metrics descriptions
        // =========================================================================
        let metrics = Metrics::new();

        // =========================================================================
        // 2. Collectors
        // =========================================================================
        let catalog = match self.catalog_override {
            Some(catalog) => catalog,
            None => {
                let mut catalog = CollectorCatalog::new();
                register_builtin(&mut catalog, &config)?;
                catalog
            }
        };
        let history = HistorySettings {
            default_size: config.collectors.default_history_size,
            overrides: config.collectors.history_size.clone(),
        };
        let mut collectors = CollectorRegistry::new(Arc::new(catalog), history);
        collectors
            .enable(&config.collectors.enabled)
            .context("failed to enable collectors")?;
        collectors.log_summary();
        if !self.skip_warmup {
            collectors.init_first_time().await;
        }
        let collectors = Arc::new(collectors);

        // =========================================================================
        // 3. Background preloader
        // =========================================================================
        let providers = match self.providers_override {
            Some(providers) => providers,
            None => ProviderRegistry::with_builtin(&config.background)?,
        };
        if !providers.contains(&config.background.provider) {
            warn!(
                provider = %config.background.provider,
                available = ?providers.names(),
                "Unknown background provider, the local provider will be used"
            );
        }
        let cache = match CacheDir::open(&config.background.cache_dir).await {
            Ok(cache) => cache,
            Err(e) => {
                metrics.increment_cache_error("purge");
                return Err(e).context("failed to prepare background cache directory");
            }
        };
        let preloader = BgPreloader::new(
            PreloaderSettings::from(&config.background),
            Arc::new(providers),
            cache,
            task_manager.clone(),
        );
        preloader.start();

        // =========================================================================
        // 4. Scheduler
        // =========================================================================
        task_manager.spawn(
            "Scheduler",
            run_scheduler(
                collectors.clone(),
                Duration::from_secs(config.collectors.interval_seconds),
                task_manager.get_shutdown_rx(),
            ),
        );

        let aggregator = SnapshotAggregator::new(collectors, preloader);
        Ok(App {
            config,
            task_manager,
            aggregator,
        })
    }
}
