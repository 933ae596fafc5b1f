//! Background image preloader.
//!
//! Keeps a queue of ready background images so that a snapshot request does
//! not wait on a provider. The queue is refilled in the background towards
//! `preload_count`; refilled images are persisted to the [`CacheDir`] and
//! queued as file references.
//!
//! # States
//!
//! - **Idle**: the queue holds `preload_count` images and nothing runs.
//! - **Refilling**: a single refill task fetches the missing images. Demand
//!   that arrives meanwhile only flags the task, which then starts its next
//!   round right away instead of backing off.
//! - **Firing**: `get()` found the queue empty. A one-shot fetch is spawned
//!   and awaited up to `fire_timeout`; its image goes straight to the caller.
//!   On timeout the task is detached, not cancelled, and its image lands in
//!   the queue (persisted like any refill) for a later request.
//!
//! # Fallback chain
//!
//! configured provider → one image from the `local` provider → a local file
//! read directly → the placeholder image. `get()` never fails.

pub mod cache;

pub use cache::{CacheDir, CacheError};

use crate::config::BackgroundConfig;
use crate::core::BgImage;
use crate::internal_metrics::Metrics;
use crate::providers::{self, BgProvider, ProviderError, ProviderRegistry, LOCAL_PROVIDER};
use crate::task_manager::TaskManager;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Tunables of a [`BgPreloader`].
#[derive(Debug, Clone)]
pub struct PreloaderSettings {
    /// Name of the active provider.
    pub provider: String,
    /// Target queue length.
    pub preload_count: usize,
    /// Ceiling on how long `get()` waits for a firing fetch.
    pub fire_timeout: Duration,
    /// Pause after a refill round that delivered nothing.
    pub refill_retry: Duration,
}

impl From<&BackgroundConfig> for PreloaderSettings {
    fn from(config: &BackgroundConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            preload_count: config.preload_count,
            fire_timeout: Duration::from_secs(config.fire_timeout_seconds),
            refill_retry: Duration::from_millis(config.refill_retry_ms),
        }
    }
}

/// Where the images of one fetch round go.
enum Delivery {
    Queue,
    /// A `get()` caller waiting on a fire. Once it gave up, images are queued.
    Waiter(Mutex<Option<oneshot::Sender<BgImage>>>),
}

#[derive(Debug, Default)]
struct RefillState {
    running: bool,
    consumed_while_loading: bool,
}

struct Inner {
    settings: PreloaderSettings,
    providers: Arc<ProviderRegistry>,
    cache: CacheDir,
    tasks: TaskManager,
    metrics: Metrics,
    queue: Mutex<VecDeque<BgImage>>,
    refill: Mutex<RefillState>,
}

/// Maintains the prefetch queue. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct BgPreloader {
    inner: Arc<Inner>,
}

impl BgPreloader {
    pub fn new(
        settings: PreloaderSettings,
        providers: Arc<ProviderRegistry>,
        cache: CacheDir,
        tasks: TaskManager,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                providers,
                cache,
                tasks,
                metrics: Metrics::default(),
                queue: Mutex::new(VecDeque::new()),
                refill: Mutex::new(RefillState::default()),
            }),
        }
    }

    /// Starts filling the queue.
    pub fn start(&self) {
        info!(
            provider = %self.inner.settings.provider,
            preload_count = self.inner.settings.preload_count,
            "Starting background preloader"
        );
        self.set_defer_preload();
    }

    pub fn settings(&self) -> &PreloaderSettings {
        &self.inner.settings
    }

    /// Number of ready images.
    pub fn queued(&self) -> usize {
        self.lock_queue().len()
    }

    /// A copy of the queue, front first.
    pub fn queue_snapshot(&self) -> Vec<BgImage> {
        self.lock_queue().iter().cloned().collect()
    }

    /// Checks if a refill task is running.
    pub fn is_refilling(&self) -> bool {
        self.lock_refill().running
    }

    /// Returns a background image. Never fails.
    ///
    /// Pops the queue when it has an entry, otherwise fires a one-shot fetch
    /// bounded by `fire_timeout` and walks the fallback chain.
    pub async fn get(&self) -> BgImage {
        if let Some(image) = self.pop_ready().await {
            return image;
        }
        self.fire().await
    }

    /// Starts a refill round unless one is running or the queue is full.
    ///
    /// While a round is running this only records that more demand arrived.
    pub fn set_defer_preload(&self) {
        let missing = {
            let mut state = self.lock_refill();
            if state.running {
                state.consumed_while_loading = true;
                return;
            }
            let missing = self.missing();
            if missing == 0 {
                return;
            }
            state.running = true;
            state.consumed_while_loading = false;
            missing
        };

        let preloader = self.clone();
        drop(
            self.inner
                .tasks
                .spawn_detached(async move { preloader.refill(missing).await }),
        );
    }

    async fn refill(&self, mut count: usize) {
        loop {
            debug!(count, "Preloading background images");
            let delivered = self.fetch_round(count, &Delivery::Queue).await;

            let (missing, consumed) = {
                let mut state = self.lock_refill();
                let consumed = std::mem::take(&mut state.consumed_while_loading);
                let missing = self.missing();
                if missing == 0 {
                    state.running = false;
                }
                (missing, consumed)
            };
            if missing == 0 {
                debug!("Preload queue is full");
                return;
            }
            if consumed {
                debug!(missing, "Images were consumed while preloading, refilling again");
            } else if delivered == 0 {
                debug!(retry_in = ?self.inner.settings.refill_retry, "Refill round delivered nothing");
                tokio::time::sleep(self.inner.settings.refill_retry).await;
            }
            count = missing;
        }
    }

    /// Fetches up to `count` images from the active provider into the queue,
    /// falling back to one local image if the provider fails.
    ///
    /// Returns how many images were queued.
    async fn fetch_round(&self, count: usize, delivery: &Delivery) -> usize {
        let name = self.inner.settings.provider.as_str();
        let (name, provider) = match self.inner.providers.get(name) {
            Some(provider) => (name, provider),
            None => {
                warn!(provider = name, "Unknown background provider, using local");
                match self.inner.providers.get(LOCAL_PROVIDER) {
                    Some(local) => (LOCAL_PROVIDER, local),
                    None => return 0,
                }
            }
        };

        let (delivered, result) = self.run_provider(provider, count, delivery).await;
        let Err(e) = result else {
            return delivered;
        };
        if name == LOCAL_PROVIDER {
            warn!(error = %e, "Local background provider failed");
            return delivered;
        }

        warn!(provider = name, error = %e, "Background provider failed, falling back to local");
        self.inner.metrics.increment_provider_fallback(name);
        let Some(local) = self.inner.providers.get(LOCAL_PROVIDER) else {
            return delivered;
        };
        let (fallback, result) = self.run_provider(local, 1, delivery).await;
        if let Err(e) = result {
            warn!(error = %e, "Local background provider failed");
        }
        delivered + fallback
    }

    /// Drains a provider's channel into the queue while the provider runs.
    async fn run_provider(
        &self,
        provider: Arc<dyn BgProvider>,
        count: usize,
        delivery: &Delivery,
    ) -> (usize, Result<(), ProviderError>) {
        let (sink, rx) = providers::channel(count);
        let produce = provider.provide(count, sink);
        let consume = async {
            let mut delivered = 0;
            while let Ok(image) = rx.recv().await {
                self.deliver(image, delivery).await;
                delivered += 1;
            }
            delivered
        };
        let (result, delivered) = tokio::join!(produce, consume);
        self.inner.metrics.increment_images_fetched(delivered as u64);
        (delivered, result)
    }

    async fn deliver(&self, image: BgImage, delivery: &Delivery) {
        let image = match delivery {
            Delivery::Queue => image,
            Delivery::Waiter(waiter) => {
                let sender = waiter.lock().unwrap_or_else(PoisonError::into_inner).take();
                match sender {
                    Some(tx) => match tx.send(image) {
                        Ok(()) => return,
                        Err(image) => {
                            debug!("Fire waiter already gave up, queueing its background");
                            image
                        }
                    },
                    None => image,
                }
            }
        };
        self.enqueue(image).await;
    }

    /// Queues an image, persisting it to the cache when preloading is on.
    async fn enqueue(&self, image: BgImage) {
        let image = if self.inner.settings.preload_count > 0 {
            self.persist(image).await
        } else {
            image
        };
        let len = {
            let mut queue = self.lock_queue();
            queue.push_back(image);
            queue.len()
        };
        self.inner.metrics.set_queue_length(len);
    }

    /// Swaps an in-memory image for a cache file. Keeps the bytes on failure.
    async fn persist(&self, image: BgImage) -> BgImage {
        match image {
            BgImage::Bytes {
                data: Some(data),
                mime,
            } => match self.inner.cache.store(&data, &mime).await {
                Ok(path) => BgImage::File { path, mime },
                Err(e) => {
                    warn!(error = %e, "Failed to cache background image, keeping it in memory");
                    self.inner.metrics.increment_cache_error("write");
                    BgImage::Bytes {
                        data: Some(data),
                        mime,
                    }
                }
            },
            other => other,
        }
    }

    /// Pops queue entries until one can be returned. Every pop triggers a
    /// refill check; unreadable cache files are discarded.
    async fn pop_ready(&self) -> Option<BgImage> {
        loop {
            let entry = {
                let mut queue = self.lock_queue();
                let entry = queue.pop_front();
                self.inner.metrics.set_queue_length(queue.len());
                entry
            }?;
            self.set_defer_preload();

            match entry {
                BgImage::File { path, mime } => match self.inner.cache.take(&path).await {
                    Ok(data) => return Some(BgImage::bytes(data, mime)),
                    Err(e) => {
                        warn!(error = %e, "Discarding unreadable cached background");
                        self.inner.metrics.increment_cache_error("read");
                    }
                },
                image => return Some(image),
            }
        }
    }

    async fn fire(&self) -> BgImage {
        let timeout = self.inner.settings.fire_timeout;
        debug!(?timeout, "Preload queue is empty, fetching a background on demand");
        self.inner.metrics.increment_fire();
        self.set_defer_preload();

        let (tx, mut rx) = oneshot::channel();
        let preloader = self.clone();
        drop(self.inner.tasks.spawn_detached(async move {
            let delivery = Delivery::Waiter(Mutex::new(Some(tx)));
            preloader.fetch_round(1, &delivery).await
        }));

        // On timeout the receiver is closed, which detaches the task: its
        // image is queued instead of handed over.
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(image)) => return image,
            Ok(Err(_)) => warn!("On-demand background fetch delivered nothing"),
            Err(_) => {
                rx.close();
                if let Ok(image) = rx.try_recv() {
                    return image;
                }
                warn!(?timeout, "Timed out waiting for a background image");
                self.inner.metrics.increment_fire_timeout();
            }
        }

        match self.inner.providers.local().pick().await {
            Ok(image) => {
                warn!("No background fetched in time, using a local file");
                self.inner.metrics.increment_local_fallback();
                image
            }
            Err(e) => {
                warn!(error = %e, "No background available, using placeholder");
                self.inner.metrics.increment_placeholder();
                BgImage::placeholder()
            }
        }
    }

    fn missing(&self) -> usize {
        self.inner.settings.preload_count.saturating_sub(self.queued())
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<BgImage>> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_refill(&self) -> std::sync::MutexGuard<'_, RefillState> {
        self.inner.refill.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for BgPreloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BgPreloader")
            .field("settings", &self.inner.settings)
            .field("queued", &self.queued())
            .field("cache", &self.inner.cache.path())
            .finish()
    }
}
