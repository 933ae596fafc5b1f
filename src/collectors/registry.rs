//! Collector catalog (registered kinds) and registry (enabled instances).

use super::{
    CollectOutcome, Collector, CollectorFailure, CollectorKind, DataSource, DeltaSource,
    FirstTimeCollector, NormalCollector, PeriodicCollector, TimeDeltaCollector,
};
use crate::core::CollectorValue;
use crate::registry::{Catalog, RegistryError};
use futures::future::{join_all, try_join_all};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

type CollectorFactory = Arc<dyn Fn(&str, usize) -> Collector + Send + Sync>;

#[derive(Clone)]
struct CatalogEntry {
    kind: CollectorKind,
    factory: CollectorFactory,
}

/// All collector kinds known to the process, keyed by unique name.
///
/// Registration is explicit and fails fast on duplicate names.
#[derive(Clone, Default)]
pub struct CollectorCatalog {
    entries: Catalog<CatalogEntry>,
}

impl CollectorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collector that runs `factory`'s source on every request.
    pub fn add_normal<F, S>(&mut self, name: &str, factory: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: DataSource + 'static,
    {
        self.insert(name, CollectorKind::Normal, move |_, _| {
            Collector::Normal(NormalCollector::new(Arc::new(factory())))
        })
    }

    /// Registers a collector whose first successful value is cached forever.
    pub fn add_first_time<F, S>(&mut self, name: &str, factory: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: DataSource + 'static,
    {
        self.insert(name, CollectorKind::FirstTime, move |_, _| {
            Collector::FirstTime(FirstTimeCollector::new(Arc::new(factory())))
        })
    }

    /// Registers a scheduler-driven collector with a bounded history.
    pub fn add_periodic<F, S>(&mut self, name: &str, factory: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: DataSource + 'static,
    {
        self.insert(name, CollectorKind::Periodic, move |name, capacity| {
            Collector::Periodic(PeriodicCollector::new(name, Arc::new(factory()), capacity))
        })
    }

    /// Registers a scheduler-driven collector reporting a rate between samples.
    pub fn add_time_delta<F, D>(&mut self, name: &str, factory: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: DeltaSource,
    {
        self.insert(name, CollectorKind::TimeDelta, move |name, capacity| {
            Collector::TimeDelta(TimeDeltaCollector::new(name, factory(), capacity))
        })
    }

    fn insert<F>(&mut self, name: &str, kind: CollectorKind, factory: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&str, usize) -> Collector + Send + Sync + 'static,
    {
        self.entries.add(
            name,
            CatalogEntry {
                kind,
                factory: Arc::new(factory),
            },
        )?;
        debug!(collector = name, kind = %kind, "Registered collector");
        Ok(self)
    }

    pub fn kind(&self, name: &str) -> Option<CollectorKind> {
        self.entries.get(name).map(|entry| entry.kind)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.names().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn instantiate(&self, name: &str, history_size: usize) -> Result<Collector, RegistryError> {
        let entry = self.entries.require(name)?;
        Ok((entry.factory)(name, history_size))
    }
}

impl std::fmt::Debug for CollectorCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorCatalog")
            .field("names", &self.names())
            .finish()
    }
}

/// History capacities for periodic collectors.
#[derive(Debug, Clone)]
pub struct HistorySettings {
    pub default_size: usize,
    pub overrides: HashMap<String, usize>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            default_size: 1,
            overrides: HashMap::new(),
        }
    }
}

impl HistorySettings {
    pub fn size_for(&self, name: &str) -> usize {
        self.overrides
            .get(name)
            .copied()
            .unwrap_or(self.default_size)
            .max(1)
    }
}

/// The collectors enabled for this process.
///
/// Built once at startup with [`CollectorRegistry::enable`], then shared
/// behind an `Arc` by the scheduler and the snapshot aggregator.
pub struct CollectorRegistry {
    catalog: Arc<CollectorCatalog>,
    history: HistorySettings,
    enabled: Catalog<Collector>,
}

impl CollectorRegistry {
    pub fn new(catalog: Arc<CollectorCatalog>, history: HistorySettings) -> Self {
        Self {
            catalog,
            history,
            enabled: Catalog::new(),
        }
    }

    /// Instantiates one collector per name from the catalog.
    ///
    /// Enabling an already enabled name is a no-op.
    ///
    /// # Returns
    /// * `Err(RegistryError::NotFound)` for the first unknown name. Names
    ///   before it stay enabled.
    pub fn enable<I, N>(&mut self, names: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            if self.enabled.contains(name) {
                debug!(collector = name, "Collector already enabled");
                continue;
            }
            let collector = self
                .catalog
                .instantiate(name, self.history.size_for(name))?;
            debug!(collector = name, kind = %collector.kind(), "Enabled collector");
            self.enabled.add(name, collector)?;
        }
        Ok(())
    }

    pub fn enabled_names(&self) -> Vec<String> {
        self.enabled.names().map(str::to_string).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Collector> {
        self.enabled.get(name)
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    /// Warms up every FirstTime collector. Failures are logged; those
    /// collectors retry on their next `get()`.
    pub async fn init_first_time(&self) {
        let warmups = self
            .enabled
            .iter()
            .filter(|(_, c)| c.kind() == CollectorKind::FirstTime)
            .map(|(name, c)| async move { (name, c.get().await) });

        for (name, result) in join_all(warmups).await {
            if let Err(e) = result {
                warn!(collector = name, error = %e, "First-time collector failed during warm-up");
            }
        }
    }

    /// Concurrently reads every enabled collector.
    ///
    /// # Returns
    /// * A map whose keys are exactly the enabled collector names.
    /// * `Err(CollectorFailure)` if any Normal or FirstTime collector fails.
    ///   No partial result is returned; the caller decides whether to abort.
    pub async fn collect_all(&self) -> Result<BTreeMap<String, CollectorValue>, CollectorFailure> {
        let reads = self.enabled.iter().map(|(name, collector)| async move {
            collector
                .get()
                .await
                .map(|value| (name.to_string(), value))
                .map_err(|source| CollectorFailure {
                    name: name.to_string(),
                    source,
                })
        });
        Ok(try_join_all(reads).await?.into_iter().collect())
    }

    /// Concurrently runs `collect()` on every periodic-family collector.
    /// Failures are contained and only logged.
    pub async fn collect_periodic(&self) {
        let collections = self
            .enabled
            .iter()
            .filter(|(_, c)| c.is_periodic())
            .map(|(_, c)| c.collect());

        let outcomes = join_all(collections).await;
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, Some(CollectOutcome::Failed)))
            .count();
        if failed > 0 {
            debug!(failed, total = outcomes.len(), "Periodic collection round finished with failures");
        }
    }

    /// Logs the enabled collectors, grouped by kind.
    pub fn log_summary(&self) {
        for kind in [
            CollectorKind::Normal,
            CollectorKind::FirstTime,
            CollectorKind::Periodic,
            CollectorKind::TimeDelta,
        ] {
            let names: Vec<&str> = self
                .enabled
                .iter()
                .filter(|(_, c)| c.kind() == kind)
                .map(|(name, _)| name)
                .collect();
            if !names.is_empty() {
                info!("Collectors ({}): {}", kind, names.join(", "));
            }
        }
    }
}
