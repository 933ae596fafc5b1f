//! Collector framework.
//!
//! A collector is a named polling strategy producing one value for a
//! snapshot. Four strategies share one interface:
//!
//! - **Normal**: runs its source on every `get()`.
//! - **FirstTime**: runs its source once and caches the value forever.
//! - **Periodic**: ticked by the scheduler through `collect()`; `get()` only
//!   reads the bounded history.
//! - **TimeDelta**: a Periodic collector whose source derives a rate from two
//!   time-stamped raw samples.
//!
//! Collector kinds are registered in a [`CollectorCatalog`] at startup and
//! instantiated into a [`CollectorRegistry`] when enabled.

pub mod builtin;
pub mod history;
pub mod kinds;
pub mod registry;
pub mod time_delta;

pub use history::History;
pub use kinds::{
    CollectOutcome, Collector, FirstTimeCollector, NormalCollector, PeriodicCollector,
    TimeDeltaCollector,
};
pub use registry::{CollectorCatalog, CollectorRegistry, HistorySettings};
pub use time_delta::TimeDelta;

use crate::core::CollectorValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// Errors a collector source can return.
#[derive(Error, Debug)]
pub enum CollectError {
    /// Not enough data for a meaningful value yet. This is the skip signal,
    /// not a failure.
    #[error("not enough data collected yet")]
    Skip,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl CollectError {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

/// A collector error tagged with the collector that produced it.
#[derive(Error, Debug)]
#[error("collector `{name}` failed: {source}")]
pub struct CollectorFailure {
    pub name: String,
    #[source]
    pub source: CollectError,
}

/// The strategy a registered collector uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectorKind {
    Normal,
    FirstTime,
    Periodic,
    TimeDelta,
}

impl CollectorKind {
    /// Whether collectors of this kind are driven by the scheduler.
    pub fn is_periodic(self) -> bool {
        matches!(self, Self::Periodic | Self::TimeDelta)
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::FirstTime => "first_time",
            Self::Periodic => "periodic",
            Self::TimeDelta => "time_delta",
        };
        f.write_str(name)
    }
}

/// Produces the value of a Normal, FirstTime or Periodic collector.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetches the current value.
    ///
    /// # Returns
    /// * `Ok(value)` on success
    /// * `Err(CollectError::Skip)` when there is nothing meaningful to report yet
    /// * `Err(CollectError::Failed)` for any other failure
    async fn fetch(&self) -> Result<CollectorValue, CollectError>;
}

/// Produces raw samples for a [`TimeDelta`] collector and turns two of them
/// into a rate.
#[async_trait]
pub trait DeltaSource: Send + Sync + 'static {
    /// The raw, cumulative sample (e.g. byte counters).
    type Raw: Send + Sync + 'static;

    async fn sample(&self) -> Result<Self::Raw, CollectError>;

    /// Computes the reported value from the previous and the current sample.
    ///
    /// `elapsed_secs` is always strictly positive.
    fn calc(
        &self,
        past: &Self::Raw,
        now: &Self::Raw,
        elapsed_secs: f64,
    ) -> Result<CollectorValue, CollectError>;
}

/// A [`DataSource`] backed by an async closure.
pub struct FnSource<F> {
    func: F,
}

/// Wraps an async closure into a [`DataSource`].
pub fn source_fn<F, Fut>(func: F) -> FnSource<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CollectorValue, CollectError>> + Send + 'static,
{
    FnSource { func }
}

#[async_trait]
impl<F, Fut> DataSource for FnSource<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CollectorValue, CollectError>> + Send + 'static,
{
    async fn fetch(&self) -> Result<CollectorValue, CollectError> {
        (self.func)().await
    }
}
