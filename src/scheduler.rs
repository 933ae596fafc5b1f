//! Drives periodic collectors on a fixed interval.

use crate::collectors::CollectorRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Ticks `collect_periodic` every `interval` until shutdown is signalled.
///
/// The first tick fires immediately. Ticks missed while a round was still
/// running are skipped rather than bunched up.
pub async fn run_scheduler(
    registry: Arc<CollectorRegistry>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval = ?interval, "Periodic collector scheduler started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                debug!("Scheduler received shutdown signal, exiting.");
                break;
            }
            _ = ticker.tick() => {
                trace!("Collecting periodic collectors");
                registry.collect_periodic().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{source_fn, CollectorCatalog, HistorySettings};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_shutdown() {
        let counter = Arc::new(AtomicU64::new(0));
        let source_counter = counter.clone();
        let mut catalog = CollectorCatalog::new();
        catalog
            .add_periodic("ticks", move || {
                let counter = source_counter.clone();
                source_fn(move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Ok(json!(n)) }
                })
            })
            .unwrap();

        let mut registry = CollectorRegistry::new(
            Arc::new(catalog),
            HistorySettings {
                default_size: 10,
                ..Default::default()
            },
        );
        registry.enable(["ticks"]).unwrap();
        let registry = Arc::new(registry);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(registry.clone(), Duration::from_secs(2), rx));

        // Ticks at t=0, 2 and 4.
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        let history = registry.get("ticks").unwrap().history().unwrap();
        assert_eq!(history, vec![json!(1), json!(2), json!(3)]);
    }
}
