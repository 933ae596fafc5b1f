//! Background image providers.
//!
//! A provider is a named async source of background images. It is asked for
//! `count` images and pushes between 0 and `count` of them into a [`BgSink`],
//! then returns. Dropping the sink closes the channel, which tells the
//! consumer the provider is done.
//!
//! Providers may under-deliver. An `Err` from [`BgProvider::provide`] means
//! the provider failed as a whole; the preloader then falls back to the
//! `local` provider.

pub mod http;
pub mod local;
pub mod none;

pub use http::{HttpSettings, LoliconProvider, UrlProvider};
pub use local::LocalProvider;
pub use none::NoneProvider;

use crate::config::BackgroundConfig;
use crate::core::BgImage;
use crate::registry::{Catalog, RegistryError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors a provider can return.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no background files found at `{}`", .0.display())]
    NoLocalFiles(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The sending half of a provider's output channel.
#[derive(Clone, Debug)]
pub struct BgSink {
    tx: async_channel::Sender<BgImage>,
}

impl BgSink {
    /// Pushes one image, waiting while the channel is full.
    ///
    /// Returns `false` once the consumer is gone; the provider should stop.
    pub async fn push(&self, image: BgImage) -> bool {
        self.tx.send(image).await.is_ok()
    }
}

/// Creates a bounded provider channel.
pub fn channel(capacity: usize) -> (BgSink, async_channel::Receiver<BgImage>) {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    (BgSink { tx }, rx)
}

/// A pluggable async source of background images.
#[async_trait]
pub trait BgProvider: Send + Sync {
    /// Pushes up to `count` images into `sink`.
    ///
    /// # Returns
    /// * `Ok(())` when done, even if fewer than `count` images were pushed
    /// * `Err(ProviderError)` when the provider could not work at all
    async fn provide(&self, count: usize, sink: BgSink) -> Result<(), ProviderError>;
}

/// Name of the provider every fallback ends at.
pub const LOCAL_PROVIDER: &str = "local";

/// The providers known to this process, keyed by name.
///
/// The `local` provider is always registered.
pub struct ProviderRegistry {
    providers: Catalog<Arc<dyn BgProvider>>,
    local: Arc<LocalProvider>,
}

impl ProviderRegistry {
    /// Creates a registry holding only the `local` provider.
    pub fn new(local: LocalProvider) -> Self {
        let local = Arc::new(local);
        let mut providers: Catalog<Arc<dyn BgProvider>> = Catalog::new();
        // The catalog is empty, so this cannot clash.
        let _ = providers.add(LOCAL_PROVIDER, local.clone() as Arc<dyn BgProvider>);
        Self { providers, local }
    }

    /// Creates a registry with every builtin provider plus the configured
    /// custom ones.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built or a custom provider reuses
    /// a taken name.
    pub fn with_builtin(config: &BackgroundConfig) -> Result<Self> {
        let settings = HttpSettings {
            timeout: Duration::from_secs(config.request_timeout_seconds),
            proxy: config.proxy.clone(),
            max_concurrent: config.max_concurrent_downloads,
        };
        let client = settings.client().context("failed to build HTTP client")?;

        let mut registry = Self::new(LocalProvider::new(&config.local_path));
        registry
            .add("none", Arc::new(NoneProvider))?
            .add(
                "loli",
                Arc::new(UrlProvider::new(
                    "loli",
                    http::LOLI_URL,
                    client.clone(),
                    settings.max_concurrent,
                )),
            )?
            .add(
                "lolicon",
                Arc::new(LoliconProvider::new(
                    http::LOLICON_API_URL,
                    config.lolicon_r18,
                    client.clone(),
                    settings.max_concurrent,
                )),
            )?;
        for custom in &config.custom {
            registry
                .add(
                    &custom.name,
                    Arc::new(UrlProvider::new(
                        &custom.name,
                        &custom.url,
                        client.clone(),
                        settings.max_concurrent,
                    )),
                )
                .with_context(|| format!("invalid custom provider `{}`", custom.name))?;
        }
        Ok(registry)
    }

    /// Registers a provider.
    ///
    /// # Errors
    /// `RegistryError::Duplicate` if the name is taken.
    pub fn add(&mut self, name: &str, provider: Arc<dyn BgProvider>) -> Result<&mut Self, RegistryError> {
        self.providers.add(name, provider)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BgProvider>> {
        self.providers.get(name).cloned()
    }

    /// The terminal fallback provider.
    pub fn local(&self) -> &LocalProvider {
        &self.local
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.names().map(str::to_string).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains(name)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
