//! The four collector strategies and the [`Collector`] enum that selects
//! between them.

use super::{CollectError, CollectorKind, DataSource, DeltaSource, History, TimeDelta};
use crate::core::CollectorValue;
use crate::internal_metrics::Metrics;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, error, trace};

/// Result of one periodic `collect()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    /// A value was appended to the history.
    Appended,
    /// The source raised the skip signal; history is unchanged.
    Skipped,
    /// The source failed; the error was logged and history is unchanged.
    Failed,
}

/// Runs its source on every call. Nothing is cached.
pub struct NormalCollector {
    source: Arc<dyn DataSource>,
}

impl NormalCollector {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    pub async fn get(&self) -> Result<CollectorValue, CollectError> {
        self.source.fetch().await
    }
}

/// Runs its source once and caches the value for the lifetime of the process.
///
/// A failed first call leaves the collector uncached, so the next call
/// retries. Concurrent first calls share a single fetch.
pub struct FirstTimeCollector {
    source: Arc<dyn DataSource>,
    cached: OnceCell<CollectorValue>,
}

impl FirstTimeCollector {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            cached: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<CollectorValue, CollectError> {
        self.cached
            .get_or_try_init(|| self.source.fetch())
            .await
            .cloned()
    }

    pub fn is_cached(&self) -> bool {
        self.cached.initialized()
    }
}

/// Collected on the scheduler's tick into a bounded history.
pub struct PeriodicCollector {
    name: String,
    source: Arc<dyn DataSource>,
    history: Mutex<History<CollectorValue>>,
    metrics: Metrics,
}

impl PeriodicCollector {
    pub fn new(name: impl Into<String>, source: Arc<dyn DataSource>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            source,
            history: Mutex::new(History::new(capacity)),
            metrics: Metrics::default(),
        }
    }

    /// Returns the history, oldest first, as a JSON array. Never fetches.
    pub async fn get(&self) -> Result<CollectorValue, CollectError> {
        Ok(CollectorValue::Array(self.history()))
    }

    /// Fetches one value and appends it to the history.
    ///
    /// Never fails: the skip signal is ignored and any other error is logged.
    pub async fn collect(&self) -> CollectOutcome {
        match self.source.fetch().await {
            Ok(value) => {
                trace!(collector = %self.name, "Collected value");
                self.history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(value);
                CollectOutcome::Appended
            }
            Err(CollectError::Skip) => {
                debug!(collector = %self.name, "Collection skipped, not enough data yet");
                self.metrics.increment_collector_skip(&self.name);
                CollectOutcome::Skipped
            }
            Err(CollectError::Failed(e)) => {
                error!(collector = %self.name, error = ?e, "Error occurred while collecting data");
                self.metrics.increment_collector_failure(&self.name);
                CollectOutcome::Failed
            }
        }
    }

    pub fn history(&self) -> Vec<CollectorValue> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn capacity(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity()
    }
}

/// A periodic collector reporting a rate computed from consecutive raw samples.
pub struct TimeDeltaCollector {
    periodic: PeriodicCollector,
}

impl TimeDeltaCollector {
    pub fn new<S: DeltaSource>(name: impl Into<String>, source: S, capacity: usize) -> Self {
        Self {
            periodic: PeriodicCollector::new(name, Arc::new(TimeDelta::new(source)), capacity),
        }
    }

    pub async fn get(&self) -> Result<CollectorValue, CollectError> {
        self.periodic.get().await
    }

    pub async fn collect(&self) -> CollectOutcome {
        self.periodic.collect().await
    }

    pub fn history(&self) -> Vec<CollectorValue> {
        self.periodic.history()
    }
}

/// An enabled collector instance.
pub enum Collector {
    Normal(NormalCollector),
    FirstTime(FirstTimeCollector),
    Periodic(PeriodicCollector),
    TimeDelta(TimeDeltaCollector),
}

impl Collector {
    pub fn kind(&self) -> CollectorKind {
        match self {
            Self::Normal(_) => CollectorKind::Normal,
            Self::FirstTime(_) => CollectorKind::FirstTime,
            Self::Periodic(_) => CollectorKind::Periodic,
            Self::TimeDelta(_) => CollectorKind::TimeDelta,
        }
    }

    pub fn is_periodic(&self) -> bool {
        self.kind().is_periodic()
    }

    /// Returns the collector's current value.
    ///
    /// For the periodic family this is the history buffer and never triggers
    /// a fetch; errors can only come from Normal and FirstTime sources.
    pub async fn get(&self) -> Result<CollectorValue, CollectError> {
        match self {
            Self::Normal(c) => c.get().await,
            Self::FirstTime(c) => c.get().await,
            Self::Periodic(c) => c.get().await,
            Self::TimeDelta(c) => c.get().await,
        }
    }

    /// Runs one periodic collection. Returns `None` for non-periodic kinds.
    pub async fn collect(&self) -> Option<CollectOutcome> {
        match self {
            Self::Periodic(c) => Some(c.collect().await),
            Self::TimeDelta(c) => Some(c.collect().await),
            Self::Normal(_) | Self::FirstTime(_) => None,
        }
    }

    /// The history of a periodic-family collector.
    pub fn history(&self) -> Option<Vec<CollectorValue>> {
        match self {
            Self::Periodic(c) => Some(c.history()),
            Self::TimeDelta(c) => Some(c.history()),
            Self::Normal(_) | Self::FirstTime(_) => None,
        }
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::source_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_source(counter: Arc<AtomicU64>) -> Arc<dyn DataSource> {
        Arc::new(source_fn(move || {
            let counter = counter.clone();
            async move { Ok(json!(counter.fetch_add(1, Ordering::SeqCst) + 1)) }
        }))
    }

    /// Yields the given values in order, then fails.
    fn sequence_source(values: Vec<i64>) -> Arc<dyn DataSource> {
        let values = Arc::new(Mutex::new(values.into_iter()));
        Arc::new(source_fn(move || {
            let next = values.lock().unwrap().next();
            async move {
                match next {
                    Some(v) => Ok(json!(v)),
                    None => Err(CollectError::Failed(anyhow::anyhow!("exhausted"))),
                }
            }
        }))
    }

    #[tokio::test]
    async fn test_normal_recomputes_every_call() {
        let counter = Arc::new(AtomicU64::new(0));
        let collector = NormalCollector::new(counting_source(counter.clone()));
        assert_eq!(collector.get().await.unwrap(), json!(1));
        assert_eq!(collector.get().await.unwrap(), json!(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_time_caches_forever() {
        let counter = Arc::new(AtomicU64::new(0));
        let collector = FirstTimeCollector::new(counting_source(counter.clone()));
        assert!(!collector.is_cached());
        for _ in 0..3 {
            assert_eq!(collector.get().await.unwrap(), json!(1));
        }
        assert!(collector.is_cached());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_time_failure_is_retried() {
        let attempts = Arc::new(AtomicU64::new(0));
        let source = {
            let attempts = attempts.clone();
            Arc::new(source_fn(move || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(CollectError::Failed(anyhow::anyhow!("first call fails")))
                    } else {
                        Ok(json!("ok"))
                    }
                }
            }))
        };
        let collector = FirstTimeCollector::new(source);

        assert!(collector.get().await.is_err());
        assert!(!collector.is_cached());
        assert_eq!(collector.get().await.unwrap(), json!("ok"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_periodic_keeps_last_n_values() {
        let collector = PeriodicCollector::new("numbers", sequence_source(vec![1, 2, 3, 4, 5]), 3);
        for _ in 0..5 {
            assert_eq!(collector.collect().await, CollectOutcome::Appended);
        }
        assert_eq!(collector.get().await.unwrap(), json!([3, 4, 5]));
    }

    #[tokio::test]
    async fn test_periodic_get_does_not_fetch() {
        let counter = Arc::new(AtomicU64::new(0));
        let collector = PeriodicCollector::new("counter", counting_source(counter.clone()), 2);
        assert_eq!(collector.get().await.unwrap(), json!([]));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_periodic_failure_leaves_history_untouched() {
        let collector = PeriodicCollector::new("flaky", sequence_source(vec![7]), 3);
        assert_eq!(collector.collect().await, CollectOutcome::Appended);
        assert_eq!(collector.collect().await, CollectOutcome::Failed);
        assert_eq!(collector.history(), vec![json!(7)]);
    }

    #[tokio::test]
    async fn test_periodic_skip_leaves_history_untouched() {
        let source = Arc::new(source_fn(|| async { Err(CollectError::Skip) }));
        let collector = PeriodicCollector::new("skipper", source, 3);
        assert_eq!(collector.collect().await, CollectOutcome::Skipped);
        assert!(collector.history().is_empty());
    }

    #[tokio::test]
    async fn test_collect_is_none_for_non_periodic() {
        let counter = Arc::new(AtomicU64::new(0));
        let collector = Collector::Normal(NormalCollector::new(counting_source(counter.clone())));
        assert_eq!(collector.collect().await, None);
        assert_eq!(collector.history(), None);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
