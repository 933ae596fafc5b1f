//! Rate-of-change source built from two time-stamped raw samples.

use super::{CollectError, DataSource, DeltaSource};
use crate::core::CollectorValue;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct RawSample<R> {
    raw: R,
    at: Instant,
}

/// Adapts a [`DeltaSource`] into a [`DataSource`].
///
/// Each fetch takes a new raw sample and passes it together with the previous
/// one and the elapsed time to [`DeltaSource::calc`]. The first fetch after
/// construction has no basis and raises [`CollectError::Skip`]. The new sample
/// is stored before returning in every case except a failed sample, so the
/// next fetch always compares against the latest good sample.
pub struct TimeDelta<S: DeltaSource> {
    source: S,
    last: Mutex<Option<RawSample<S::Raw>>>,
}

impl<S: DeltaSource> TimeDelta<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            last: Mutex::new(None),
        }
    }

    /// Whether a previous raw sample is available.
    pub async fn has_basis(&self) -> bool {
        self.last.lock().await.is_some()
    }
}

#[async_trait]
impl<S: DeltaSource> DataSource for TimeDelta<S> {
    async fn fetch(&self) -> Result<CollectorValue, CollectError> {
        // Held across the sample so overlapping ticks cannot interleave.
        let mut last = self.last.lock().await;
        let now = Instant::now();
        let current = RawSample {
            raw: self.source.sample().await?,
            at: now,
        };

        let result = match last.as_ref() {
            None => Err(CollectError::Skip),
            Some(past) => {
                let elapsed = now.duration_since(past.at).as_secs_f64();
                if elapsed > 0.0 {
                    self.source.calc(&past.raw, &current.raw, elapsed)
                } else {
                    Err(CollectError::Skip)
                }
            }
        };

        *last = Some(current);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{CollectOutcome, TimeDeltaCollector};
    use serde_json::json;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    /// Returns queued raw counter values; `calc` reports the per-second rate.
    struct Counter {
        values: Arc<StdMutex<Vec<f64>>>,
    }

    impl Counter {
        fn new(values: Vec<f64>) -> Self {
            Self {
                values: Arc::new(StdMutex::new(values.into_iter().rev().collect())),
            }
        }
    }

    #[async_trait]
    impl DeltaSource for Counter {
        type Raw = f64;

        async fn sample(&self) -> Result<f64, CollectError> {
            self.values
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| CollectError::Failed(anyhow::anyhow!("no more samples")))
        }

        fn calc(&self, past: &f64, now: &f64, elapsed_secs: f64) -> Result<CollectorValue, CollectError> {
            Ok(json!((now - past) / elapsed_secs))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_is_skipped() {
        let delta = TimeDelta::new(Counter::new(vec![10.0]));
        assert!(matches!(delta.fetch().await, Err(CollectError::Skip)));
        assert!(delta.has_basis().await, "First sample must be kept as basis");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_from_two_samples() {
        let collector = TimeDeltaCollector::new("counter", Counter::new(vec![10.0, 20.0]), 5);

        assert_eq!(collector.collect().await, CollectOutcome::Skipped);
        assert!(collector.history().is_empty());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(collector.collect().await, CollectOutcome::Appended);
        assert_eq!(collector.history(), vec![json!(5.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_rate_uses_latest_basis() {
        let collector = TimeDeltaCollector::new("counter", Counter::new(vec![0.0, 10.0, 40.0]), 5);
        collector.collect().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        collector.collect().await;
        tokio::time::advance(Duration::from_secs(3)).await;
        collector.collect().await;
        assert_eq!(collector.history(), vec![json!(10.0), json!(10.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sample_keeps_previous_basis() {
        let collector = TimeDeltaCollector::new("counter", Counter::new(vec![10.0]), 5);
        assert_eq!(collector.collect().await, CollectOutcome::Skipped);
        assert_eq!(collector.collect().await, CollectOutcome::Failed);
        assert!(collector.history().is_empty());
    }
}
